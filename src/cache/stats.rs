//! Read-only cache statistics.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;

/// Snapshot of the schema cache.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaCacheStatistics {
    pub total_entries: u64,
    pub entries_with_ttl: u64,
    pub memory_cache_size: usize,
    pub table_identifier: String,
    pub query_time_ms: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Set when the persistent counts could not be read; counts are then zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of the facet cache.
#[derive(Debug, Clone, Serialize)]
pub struct FacetCacheStatistics {
    pub total_entries: u64,
    /// Row counts keyed by facet type name.
    pub by_type: BTreeMap<String, u64>,
    pub memory_cache_size: usize,
    pub cache_table: String,
    pub query_time: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Combined report produced by `StatisticsReporter`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub schema: SchemaCacheStatistics,
    pub facet: FacetCacheStatistics,
}
