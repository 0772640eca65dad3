//! Repository traits describing persistence adapters.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::SchemaRecord;
use crate::domain::types::FacetType;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("table `{table}` does not exist")]
    MissingTable { table: String },
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn missing_table(table: impl Into<String>) -> Self {
        Self::MissingTable {
            table: table.into(),
        }
    }

    pub fn is_missing_table(&self) -> bool {
        matches!(self, RepoError::MissingTable { .. })
    }
}

/// Persisted row of the schema cache table.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaCacheEntry {
    pub id: i64,
    pub schema_id: i64,
    pub cache_key: String,
    pub cache_data: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct UpsertSchemaCacheEntry {
    pub schema_id: i64,
    pub cache_key: String,
    pub cache_data: String,
    pub expires_at: Option<OffsetDateTime>,
    pub now: OffsetDateTime,
}

/// Persisted row of the facet cache table.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetCacheEntry {
    pub id: i64,
    pub schema_id: i64,
    pub facet_type: FacetType,
    pub field_name: String,
    pub facet_config: Option<String>,
    pub cache_data: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct UpsertFacetCacheEntry {
    pub schema_id: i64,
    pub facet_type: FacetType,
    pub field_name: String,
    pub facet_config: Option<String>,
    pub cache_data: String,
    pub expires_at: Option<OffsetDateTime>,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaCacheCounts {
    pub total: u64,
    pub with_ttl: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetCacheCounts {
    pub total: u64,
    pub by_type: BTreeMap<FacetType, u64>,
}

/// Authoritative schema lookup consumed on a full cache miss.
#[async_trait]
pub trait SchemaRepo: Send + Sync {
    /// Returns `RepoError::NotFound` when no schema has the given id.
    async fn find_schema(&self, id: i64) -> Result<SchemaRecord, RepoError>;
}

#[async_trait]
pub trait SchemaCacheRepo: Send + Sync {
    /// Name of the backing table, reported in statistics.
    fn schema_cache_table(&self) -> &str;

    async fn schema_cache_table_exists(&self) -> Result<bool, RepoError>;

    /// Returns the live entry for the key; rows with `expires_at <= now` are ignored.
    async fn find_schema_entry(
        &self,
        schema_id: i64,
        cache_key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<SchemaCacheEntry>, RepoError>;

    async fn upsert_schema_entry(&self, entry: &UpsertSchemaCacheEntry) -> Result<(), RepoError>;

    async fn delete_schema_entries(&self, schema_id: i64) -> Result<u64, RepoError>;

    async fn delete_all_schema_entries(&self) -> Result<u64, RepoError>;

    /// Deletes rows with a non-null `expires_at` strictly before `now`.
    async fn delete_expired_schema_entries(&self, now: OffsetDateTime) -> Result<u64, RepoError>;

    async fn schema_entry_counts(&self) -> Result<SchemaCacheCounts, RepoError>;
}

#[async_trait]
pub trait FacetCacheRepo: Send + Sync {
    fn facet_cache_table(&self) -> &str;

    async fn facet_cache_table_exists(&self) -> Result<bool, RepoError>;

    async fn find_facet_entry(
        &self,
        schema_id: i64,
        facet_type: FacetType,
        field_name: &str,
        now: OffsetDateTime,
    ) -> Result<Option<FacetCacheEntry>, RepoError>;

    async fn upsert_facet_entry(&self, entry: &UpsertFacetCacheEntry) -> Result<(), RepoError>;

    async fn delete_facet_entries(&self, schema_id: i64) -> Result<u64, RepoError>;

    async fn delete_facet_entries_of_types(&self, types: &[FacetType]) -> Result<u64, RepoError>;

    async fn delete_all_facet_entries(&self) -> Result<u64, RepoError>;

    async fn delete_expired_facet_entries(&self, now: OffsetDateTime) -> Result<u64, RepoError>;

    async fn facet_entry_counts(&self) -> Result<FacetCacheCounts, RepoError>;
}
