//! Two-tier schema and facet cache for data-register applications.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
