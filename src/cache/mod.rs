//! Schema and facet caching.
//!
//! Two caches sit in front of the authoritative schema store, each with two
//! tiers:
//!
//! - **Memory tier**: per-process LRU map of deserialized payloads
//! - **Persistent tier**: the shared `schema_cache` / `facet_cache` tables
//!
//! Mutations reach the caches through `CacheInvalidator`; expired rows are
//! removed by `ExpirySweeper`.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `regcache.toml`:
//!
//! ```toml
//! [cache]
//! enable_memory_tier = true
//! enable_persistent_tier = true
//! default_ttl_secs = 3600
//! max_ttl_secs = 28800
//! # ... see config.rs for all options
//! ```

mod config;
mod error;
mod events;
mod facet;
mod invalidator;
mod keys;
mod memory;
mod payload;
mod schema;
mod stats;
mod sweeper;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod tier;

use std::sync::Arc;

use tracing::info;

use crate::application::repos::{FacetCacheRepo, SchemaCacheRepo, SchemaRepo};

pub use config::{CacheConfig, MAX_TTL_SECS};
pub use error::CacheError;
pub use events::{
    InvalidationEvent, InvalidationOutcome, InvalidationPlan, InvalidationReport, TierOutcome,
};
pub use facet::{FACET_CACHE, FacetCache};
pub use invalidator::CacheInvalidator;
pub use keys::{ArtifactKey, FACETABLE_FIELDS, facet_result_key, facetable_fields_key};
pub use memory::{MemoryEntry, MemoryStore};
pub use payload::{CachePayload, SchemaSnapshot};
pub use schema::{SCHEMA_CACHE, SchemaCache};
pub use stats::{CacheStatistics, FacetCacheStatistics, SchemaCacheStatistics};
pub use sweeper::{ExpirySweeper, StatisticsReporter, SweepReport};
pub use tier::{
    METRIC_CACHE_INVALIDATION_TOTAL, METRIC_CACHE_LOOKUP_TOTAL, METRIC_CACHE_STATS_QUERY_MS,
    METRIC_CACHE_STORE_ERROR_TOTAL, METRIC_CACHE_SWEEP_REMOVED_TOTAL,
};

/// Both caches wired to one backing store.
#[derive(Clone)]
pub struct CacheServices {
    pub schema: Arc<SchemaCache>,
    pub facet: Arc<FacetCache>,
}

impl CacheServices {
    pub fn new<R>(config: CacheConfig, repos: Arc<R>) -> Self
    where
        R: SchemaRepo + SchemaCacheRepo + FacetCacheRepo + 'static,
    {
        Self {
            schema: Arc::new(SchemaCache::new(config.clone(), repos.clone(), repos.clone())),
            facet: Arc::new(FacetCache::new(config, repos)),
        }
    }

    /// Builds the services and checks once that both cache tables exist.
    pub async fn start<R>(config: CacheConfig, repos: Arc<R>) -> Self
    where
        R: SchemaRepo + SchemaCacheRepo + FacetCacheRepo + 'static,
    {
        let services = Self::new(config, repos);
        let schema_persistent = services.schema.probe().await;
        let facet_persistent = services.facet.probe().await;
        info!(schema_persistent, facet_persistent, "Cache services started");
        services
    }

    pub fn invalidator(&self) -> CacheInvalidator {
        CacheInvalidator::new(self.schema.clone(), self.facet.clone())
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(self.schema.clone(), self.facet.clone())
    }

    pub fn reporter(&self) -> StatisticsReporter {
        StatisticsReporter::new(self.schema.clone(), self.facet.clone())
    }
}
