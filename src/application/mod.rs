//! Application services layer.

pub mod bulk;
pub mod error;
pub mod repos;
