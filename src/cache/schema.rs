//! Two-tier cache of schema snapshots and their sub-artifacts.
//!
//! Lookups consult the process-local memory tier, then the shared
//! `schema_cache` table, then the authoritative `SchemaRepo`. Persistent-tier
//! failures never surface to callers; the cache degrades to memory-only.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::application::repos::{RepoError, SchemaCacheRepo, SchemaRepo, UpsertSchemaCacheEntry};
use crate::domain::entities::SchemaRecord;
use crate::domain::types::MutationOperation;

use super::config::CacheConfig;
use super::events::{InvalidationReport, TierOutcome};
use super::keys::ArtifactKey;
use super::memory::{MemoryEntry, MemoryStore};
use super::payload::{CachePayload, SchemaSnapshot};
use super::stats::SchemaCacheStatistics;
use super::tier::{METRIC_CACHE_STATS_QUERY_MS, PersistentTier, expiry, record_lookup};

pub const SCHEMA_CACHE: &str = "schema";

pub struct SchemaCache {
    config: CacheConfig,
    memory: MemoryStore,
    store: Arc<dyn SchemaCacheRepo>,
    schemas: Arc<dyn SchemaRepo>,
    persistent: PersistentTier,
}

impl SchemaCache {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn SchemaCacheRepo>,
        schemas: Arc<dyn SchemaRepo>,
    ) -> Self {
        let memory = MemoryStore::new(
            SCHEMA_CACHE,
            config.schema_memory_limit_non_zero(),
            config.enable_memory_tier,
        );
        let persistent = PersistentTier::new(SCHEMA_CACHE, config.enable_persistent_tier);
        Self {
            config,
            memory,
            store,
            schemas,
            persistent,
        }
    }

    /// Checks once that the cache table exists; a missing table turns the
    /// persistent tier off for the lifetime of this cache.
    pub async fn probe(&self) -> bool {
        if !self.persistent.is_available() {
            return false;
        }
        let probe = self.store.schema_cache_table_exists().await;
        self.persistent
            .apply_probe(self.store.schema_cache_table(), probe)
    }

    pub fn persistent_enabled(&self) -> bool {
        self.persistent.is_available()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Returns the snapshot of `schema_id`, loading and caching it on a full miss.
    ///
    /// `Ok(None)` means the schema does not exist. Only errors of the
    /// authoritative repository are returned.
    #[instrument(skip(self))]
    pub async fn get(&self, schema_id: i64) -> Result<Option<SchemaSnapshot>, RepoError> {
        if let Some(CachePayload::SchemaObject(snapshot)) =
            self.lookup(schema_id, &ArtifactKey::SchemaObject).await
        {
            return Ok(Some(snapshot));
        }

        match self.schemas.find_schema(schema_id).await {
            Ok(schema) => {
                record_lookup(SCHEMA_CACHE, "authoritative", "hit");
                let snapshot = SchemaSnapshot::from(&schema);
                self.put_snapshot(&snapshot, None).await;
                Ok(Some(snapshot))
            }
            Err(RepoError::NotFound) => {
                record_lookup(SCHEMA_CACHE, "authoritative", "miss");
                debug!(schema_id, "Schema not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get_configuration(
        &self,
        schema_id: i64,
    ) -> Result<Option<Map<String, Value>>, RepoError> {
        if let Some(CachePayload::Configuration { configuration }) =
            self.lookup(schema_id, &ArtifactKey::Configuration).await
        {
            return Ok(Some(configuration));
        }
        Ok(self
            .get(schema_id)
            .await?
            .map(|snapshot| snapshot.configuration))
    }

    pub async fn get_properties(
        &self,
        schema_id: i64,
    ) -> Result<Option<Map<String, Value>>, RepoError> {
        if let Some(CachePayload::Properties { properties }) =
            self.lookup(schema_id, &ArtifactKey::Properties).await
        {
            return Ok(Some(properties));
        }
        Ok(self.get(schema_id).await?.map(|snapshot| snapshot.properties))
    }

    /// Caches `schema` together with its configuration and properties.
    ///
    /// A missing or zero `ttl` uses the configured default; every TTL is capped
    /// at the configured maximum.
    #[instrument(skip(self, schema), fields(schema_id = schema.id))]
    pub async fn put(&self, schema: &SchemaRecord, ttl: Option<Duration>) {
        self.put_snapshot(&SchemaSnapshot::from(schema), ttl).await;
    }

    async fn put_snapshot(&self, snapshot: &SchemaSnapshot, ttl: Option<Duration>) {
        let now = OffsetDateTime::now_utc();
        let schema_id = snapshot.id;
        let Some(expires_at) = expiry(now, self.config.schema_ttl(ttl)) else {
            warn!(schema_id, "Schema not cached: expiry out of range");
            return;
        };

        self.write(
            schema_id,
            &ArtifactKey::SchemaObject,
            CachePayload::SchemaObject(snapshot.clone()),
            now,
            expires_at,
        )
        .await;
        self.write(
            schema_id,
            &ArtifactKey::Configuration,
            CachePayload::Configuration {
                configuration: snapshot.configuration.clone(),
            },
            now,
            expires_at,
        )
        .await;
        self.write(
            schema_id,
            &ArtifactKey::Properties,
            CachePayload::Properties {
                properties: snapshot.properties.clone(),
            },
            now,
            expires_at,
        )
        .await;

        debug!(schema_id, expires_at = %expires_at, "Schema cached");
    }

    /// Stores a caller-defined artifact under `custom:{name}`.
    pub async fn put_artifact(
        &self,
        schema_id: i64,
        name: &str,
        value: Value,
        ttl: Option<Duration>,
    ) {
        let now = OffsetDateTime::now_utc();
        let Some(expires_at) = expiry(now, self.config.schema_ttl(ttl)) else {
            warn!(schema_id, name, "Artifact not cached: expiry out of range");
            return;
        };
        let payload = CachePayload::Custom {
            name: name.to_string(),
            value,
        };
        self.write(schema_id, &ArtifactKey::custom(name), payload, now, expires_at)
            .await;
    }

    pub async fn get_artifact(&self, schema_id: i64, name: &str) -> Option<Value> {
        match self.lookup(schema_id, &ArtifactKey::custom(name)).await {
            Some(CachePayload::Custom {
                name: stored,
                value,
            }) if stored == name => Some(value),
            _ => None,
        }
    }

    /// Removes every cached artifact of `schema_id` from both tiers.
    ///
    /// Persistent failures are logged and reported, never returned; the memory
    /// tier is cleared regardless.
    #[instrument(skip(self))]
    pub async fn invalidate(
        &self,
        schema_id: i64,
        operation: MutationOperation,
    ) -> InvalidationReport {
        let persistent = if self.persistent.is_available() {
            let result = self.store.delete_schema_entries(schema_id).await;
            self.persistent
                .delete_outcome("invalidate", Some(schema_id), result)
        } else {
            TierOutcome::Skipped
        };
        let memory_removed = self.memory.remove_scope(schema_id);

        debug!(
            schema_id,
            operation = %operation,
            persistent = persistent.label(),
            persistent_removed = persistent.removed(),
            memory_removed,
            "Schema cache invalidated"
        );

        InvalidationReport {
            cache: SCHEMA_CACHE,
            persistent,
            memory_removed,
        }
    }

    /// Empties both tiers.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> InvalidationReport {
        let persistent = if self.persistent.is_available() {
            let result = self.store.delete_all_schema_entries().await;
            self.persistent.delete_outcome("clear_all", None, result)
        } else {
            TierOutcome::Skipped
        };
        let memory_removed = self.memory.clear();

        info!(
            persistent = persistent.label(),
            persistent_removed = persistent.removed(),
            memory_removed,
            "Schema cache cleared"
        );

        InvalidationReport {
            cache: SCHEMA_CACHE,
            persistent,
            memory_removed,
        }
    }

    pub fn clear_memory(&self) -> usize {
        let removed = self.memory.clear();
        debug!(removed, "Schema memory tier cleared");
        removed
    }

    /// Deletes persisted rows whose expiry has passed; live rows are untouched.
    pub async fn sweep_expired(&self) -> u64 {
        let now = OffsetDateTime::now_utc();
        let memory_removed = self.memory.remove_where(|_, entry| entry.is_expired(now));
        if memory_removed > 0 {
            debug!(memory_removed, "Expired schema memory entries dropped");
        }

        if !self.persistent.is_available() {
            return 0;
        }
        match self.store.delete_expired_schema_entries(now).await {
            Ok(removed) => removed,
            Err(err) => {
                self.persistent.report_error("sweep", None, &err);
                0
            }
        }
    }

    /// Read-only snapshot of both tiers.
    pub async fn statistics(&self) -> SchemaCacheStatistics {
        let started = Instant::now();
        let counts = if self.persistent.is_available() {
            self.store.schema_entry_counts().await
        } else {
            Ok(Default::default())
        };
        let query_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_CACHE_STATS_QUERY_MS, "cache" => SCHEMA_CACHE).record(query_time_ms);

        let (counts, error) = match counts {
            Ok(counts) => (counts, None),
            Err(err) => {
                self.persistent.report_error("statistics", None, &err);
                (Default::default(), Some(err.to_string()))
            }
        };

        SchemaCacheStatistics {
            total_entries: counts.total,
            entries_with_ttl: counts.with_ttl,
            memory_cache_size: self.memory.len(),
            table_identifier: self.store.schema_cache_table().to_string(),
            query_time_ms,
            timestamp: OffsetDateTime::now_utc(),
            error,
        }
    }

    async fn lookup(&self, schema_id: i64, key: &ArtifactKey) -> Option<CachePayload> {
        let memory_key = key.memory_key(schema_id);
        let now = OffsetDateTime::now_utc();

        if self.memory.is_enabled() {
            if let Some(payload) = self.memory.get_at(&memory_key, now) {
                record_lookup(SCHEMA_CACHE, "memory", "hit");
                debug!(schema_id, key = %key, tier = "memory", "Schema cache hit");
                return Some(payload);
            }
            record_lookup(SCHEMA_CACHE, "memory", "miss");
        }

        if !self.persistent.is_available() {
            return None;
        }

        let entry = match self
            .store
            .find_schema_entry(schema_id, &key.cache_key(), now)
            .await
        {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                record_lookup(SCHEMA_CACHE, "persistent", "miss");
                return None;
            }
            Err(err) => {
                self.persistent.report_error("get", Some(schema_id), &err);
                return None;
            }
        };

        match CachePayload::decode(&memory_key, &entry.cache_data, key.artifact()) {
            Ok(payload) => {
                record_lookup(SCHEMA_CACHE, "persistent", "hit");
                debug!(schema_id, key = %key, tier = "persistent", "Schema cache hit");
                self.memory.insert(
                    memory_key,
                    MemoryEntry::new(Some(schema_id), payload.clone(), entry.expires_at),
                );
                Some(payload)
            }
            Err(err) => {
                record_lookup(SCHEMA_CACHE, "persistent", "corrupt");
                error!(
                    schema_id,
                    key = %key,
                    error = %err,
                    "Discarding undecodable schema cache entry"
                );
                None
            }
        }
    }

    async fn write(
        &self,
        schema_id: i64,
        key: &ArtifactKey,
        payload: CachePayload,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) {
        if self.persistent.is_available() {
            match payload.encode() {
                Ok(cache_data) => {
                    let entry = UpsertSchemaCacheEntry {
                        schema_id,
                        cache_key: key.cache_key(),
                        cache_data,
                        expires_at: Some(expires_at),
                        now,
                    };
                    if let Err(err) = self.store.upsert_schema_entry(&entry).await {
                        self.persistent.report_error("put", Some(schema_id), &err);
                    }
                }
                Err(err) => {
                    error!(schema_id, key = %key, error = %err, "Schema artifact not encodable");
                    return;
                }
            }
        }

        if let Some(evicted) = self.memory.insert(
            key.memory_key(schema_id),
            MemoryEntry::new(Some(schema_id), payload, Some(expires_at)),
        ) {
            debug!(evicted = %evicted, "Schema memory tier evicted entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::cache::testing::{Failure, FakeStore, schema};

    fn cache_with(store: &Arc<FakeStore>, config: CacheConfig) -> SchemaCache {
        SchemaCache::new(config, store.clone(), store.clone())
    }

    fn cache(store: &Arc<FakeStore>) -> SchemaCache {
        cache_with(store, CacheConfig::default())
    }

    #[tokio::test]
    async fn full_miss_loads_and_populates_both_tiers() {
        let store = Arc::new(FakeStore::new());
        store.insert_schema(schema(7));
        let cache = cache(&store);

        let snapshot = cache.get(7).await.expect("lookup").expect("schema exists");
        assert_eq!(snapshot.id, 7);
        assert!(store.schema_row(7, "schema_object").is_some());
        assert!(store.schema_row(7, "configuration").is_some());
        assert!(store.schema_row(7, "properties").is_some());
        assert!(cache.memory().contains_key("schema_object_7"));

        cache.get(7).await.expect("second lookup");
        assert_eq!(store.authoritative_reads.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unknown_schema_is_none() {
        let store = Arc::new(FakeStore::new());
        let cache = cache(&store);
        assert!(cache.get(404).await.expect("lookup").is_none());
        assert_eq!(store.schema_row_count(), 0);
    }

    #[tokio::test]
    async fn persistent_hit_refills_memory() {
        let store = Arc::new(FakeStore::new());
        store.insert_schema(schema(3));
        let cache = cache(&store);
        cache.get(3).await.expect("warm");
        cache.clear_memory();

        let properties = cache.get_properties(3).await.expect("lookup");
        assert!(properties.is_some_and(|p| p.contains_key("status")));
        assert!(cache.memory().contains_key("properties_3"));
        assert_eq!(store.authoritative_reads.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn configuration_is_served_from_the_persistent_tier() {
        let store = Arc::new(FakeStore::new());
        let cache = cache(&store);
        cache.put(&schema(3), None).await;
        cache.clear_memory();

        let configuration = cache
            .get_configuration(3)
            .await
            .expect("lookup")
            .expect("configuration cached");
        assert_eq!(Value::Object(configuration), json!({"objectNameField": "title"}));
        assert!(cache.memory().contains_key("configuration_3"));
        assert_eq!(store.authoritative_reads.load(Ordering::Relaxed), 0);

        store.insert_schema(schema(4));
        let configuration = cache.get_configuration(4).await.expect("lookup");
        assert!(configuration.is_some_and(|c| c.contains_key("objectNameField")));
        assert_eq!(store.authoritative_reads.load(Ordering::Relaxed), 1);
        assert!(cache.get_configuration(404).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn undecodable_row_is_treated_as_a_miss() {
        let store = Arc::new(FakeStore::new());
        store.insert_schema(schema(5));
        store.put_raw_schema_row(5, "schema_object", "{not json");
        let cache = cache(&store);

        let snapshot = cache.get(5).await.expect("lookup");
        assert_eq!(snapshot.map(|s| s.id), Some(5));
        assert_eq!(store.authoritative_reads.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn ttl_is_clamped() {
        let store = Arc::new(FakeStore::new());
        let cache = cache(&store);
        let before = OffsetDateTime::now_utc();

        cache
            .put(&schema(2), Some(Duration::from_secs(7 * 24 * 60 * 60)))
            .await;

        let row = store.schema_row(2, "schema_object").expect("row written");
        let expires = row.expires_at.expect("expiry set");
        assert!(expires <= OffsetDateTime::now_utc() + Duration::from_secs(28_800));
        assert!(expires > before + Duration::from_secs(28_000));
    }

    #[tokio::test]
    async fn oversized_ttl_and_ceiling_do_not_overflow() {
        let store = Arc::new(FakeStore::new());
        let config = CacheConfig {
            max_ttl_secs: u64::MAX,
            ..CacheConfig::default()
        };
        let cache = cache_with(&store, config);

        cache
            .put(&schema(2), Some(Duration::from_secs(u64::MAX)))
            .await;
        cache
            .put_artifact(2, "layout", json!({"columns": 2}), Some(Duration::MAX))
            .await;

        let row = store.schema_row(2, "schema_object").expect("row written");
        let expires = row.expires_at.expect("expiry set");
        assert!(expires <= OffsetDateTime::now_utc() + Duration::from_secs(28_800));
        assert!(store.schema_row(2, "custom:layout").is_some());
    }

    #[tokio::test]
    async fn invalidate_clears_only_the_scope() {
        let store = Arc::new(FakeStore::new());
        let cache = cache(&store);
        for id in [7, 17, 70] {
            cache.put(&schema(id), None).await;
        }

        let report = cache.invalidate(7, MutationOperation::Update).await;
        assert_eq!(report.persistent, TierOutcome::Removed(3));
        assert_eq!(report.memory_removed, 3);
        assert!(store.schema_row(17, "schema_object").is_some());
        assert!(cache.memory().contains_key("schema_object_70"));

        let again = cache.invalidate(7, MutationOperation::Update).await;
        assert_eq!(again.persistent, TierOutcome::Removed(0));
        assert_eq!(again.memory_removed, 0);
    }

    #[tokio::test]
    async fn store_failure_still_clears_memory() {
        let store = Arc::new(FakeStore::new());
        let cache = cache(&store);
        cache.put(&schema(9), None).await;

        store.fail_with(Some(Failure::Unavailable));
        let report = cache.invalidate(9, MutationOperation::Delete).await;
        assert!(!report.is_success());
        assert_eq!(report.memory_removed, 3);

        store.fail_with(Some(Failure::MissingTable));
        let report = cache.invalidate(9, MutationOperation::Delete).await;
        assert!(report.is_success());
        assert_eq!(report.persistent, TierOutcome::MissingTable);
    }

    #[tokio::test]
    async fn probe_disables_missing_table() {
        let store = Arc::new(FakeStore::new());
        store.set_table_present(false);
        let cache = cache(&store);

        assert!(!cache.probe().await);
        cache.put(&schema(1), None).await;
        assert_eq!(store.schema_row_count(), 0);
        assert!(cache.memory().contains_key("schema_object_1"));
        assert_eq!(
            cache.invalidate(1, MutationOperation::Update).await.persistent,
            TierOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn custom_artifacts_roundtrip() {
        let store = Arc::new(FakeStore::new());
        let cache = cache(&store);
        cache
            .put_artifact(4, "search_index", Value::from("idx-4"), None)
            .await;

        assert!(store.schema_row(4, "custom:search_index").is_some());
        cache.clear_memory();
        assert_eq!(
            cache.get_artifact(4, "search_index").await,
            Some(Value::from("idx-4"))
        );
        assert!(cache.get_artifact(4, "other").await.is_none());
    }

    #[tokio::test]
    async fn statistics_report_counts_and_errors() {
        let store = Arc::new(FakeStore::new());
        let cache = cache(&store);
        cache.put(&schema(1), None).await;

        let stats = cache.statistics().await;
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.entries_with_ttl, 3);
        assert_eq!(stats.memory_cache_size, 3);
        assert_eq!(stats.table_identifier, "schema_cache");
        assert!(stats.error.is_none());

        store.fail_with(Some(Failure::Unavailable));
        let stats = cache.statistics().await;
        assert_eq!(stats.total_entries, 0);
        assert!(stats.error.is_some());
        assert_eq!(stats.memory_cache_size, 3);
    }

    #[tokio::test]
    async fn memory_tier_can_be_disabled() {
        let store = Arc::new(FakeStore::new());
        store.insert_schema(schema(8));
        let cache = cache_with(
            &store,
            CacheConfig {
                enable_memory_tier: false,
                ..Default::default()
            },
        );

        cache.get(8).await.expect("load");
        cache.get(8).await.expect("persistent hit");
        assert!(cache.memory().is_empty());
        assert_eq!(store.authoritative_reads.load(Ordering::Relaxed), 1);
    }
}
