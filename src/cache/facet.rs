//! Two-tier cache of facet discovery and computed facet results.
//!
//! Entries are keyed by `(schema_id, facet_type, field_name)`. Discovery is
//! stored as a `config` row under the `facetable_fields` field name; results
//! use the aggregation facet types.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::application::repos::{FacetCacheRepo, UpsertFacetCacheEntry};
use crate::domain::types::{FacetType, MutationOperation};

use super::config::CacheConfig;
use super::events::{InvalidationReport, TierOutcome};
use super::keys::{ArtifactKey, FACETABLE_FIELDS, facet_result_key, facetable_fields_key};
use super::memory::{MemoryEntry, MemoryStore};
use super::payload::CachePayload;
use super::stats::FacetCacheStatistics;
use super::tier::{METRIC_CACHE_STATS_QUERY_MS, PersistentTier, expiry, record_lookup};

pub const FACET_CACHE: &str = "facet";

pub struct FacetCache {
    config: CacheConfig,
    memory: MemoryStore,
    store: Arc<dyn FacetCacheRepo>,
    persistent: PersistentTier,
}

impl FacetCache {
    pub fn new(config: CacheConfig, store: Arc<dyn FacetCacheRepo>) -> Self {
        let memory = MemoryStore::new(
            FACET_CACHE,
            config.facet_memory_limit_non_zero(),
            config.enable_memory_tier,
        );
        let persistent = PersistentTier::new(FACET_CACHE, config.enable_persistent_tier);
        Self {
            config,
            memory,
            store,
            persistent,
        }
    }

    pub async fn probe(&self) -> bool {
        if !self.persistent.is_available() {
            return false;
        }
        let probe = self.store.facet_cache_table_exists().await;
        self.persistent
            .apply_probe(self.store.facet_cache_table(), probe)
    }

    pub fn persistent_enabled(&self) -> bool {
        self.persistent.is_available()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Caches which fields of `schema_id` can be faceted on.
    #[instrument(skip(self, fields))]
    pub async fn cache_facetable_fields(
        &self,
        schema_id: i64,
        fields: Map<String, Value>,
        ttl: Option<Duration>,
    ) {
        let ttl = self.config.facet_config_ttl(ttl);
        self.write(
            schema_id,
            FacetType::Config,
            FACETABLE_FIELDS,
            None,
            CachePayload::FacetableFields { fields },
            facetable_fields_key(schema_id),
            ttl,
        )
        .await;
    }

    pub async fn get_facetable_fields(&self, schema_id: i64) -> Option<Map<String, Value>> {
        match self
            .lookup(
                schema_id,
                FacetType::Config,
                FACETABLE_FIELDS,
                facetable_fields_key(schema_id),
                ArtifactKey::FacetableFields.artifact(),
            )
            .await
        {
            Some(CachePayload::FacetableFields { fields }) => Some(fields),
            _ => None,
        }
    }

    /// Caches a computed aggregation for one field.
    ///
    /// `config` is the facet configuration the result was computed with and is
    /// stored alongside it. `FacetType::Config` is not a result type and is
    /// ignored.
    #[instrument(skip(self, config, data))]
    pub async fn cache_facet_result(
        &self,
        schema_id: i64,
        facet_type: FacetType,
        field_name: &str,
        config: Option<&Value>,
        data: Value,
        ttl: Option<Duration>,
    ) {
        if !facet_type.is_result() {
            warn!(schema_id, field_name, "Facet result rejected for config facet type");
            return;
        }
        let ttl = self.config.facet_result_ttl(ttl);
        let payload = CachePayload::FacetResult {
            facet_type,
            field_name: field_name.to_string(),
            data,
        };
        self.write(
            schema_id,
            facet_type,
            field_name,
            config,
            payload,
            facet_result_key(schema_id, facet_type, field_name),
            ttl,
        )
        .await;
    }

    pub async fn get_facet_result(
        &self,
        schema_id: i64,
        facet_type: FacetType,
        field_name: &str,
    ) -> Option<Value> {
        if !facet_type.is_result() {
            return None;
        }
        match self
            .lookup(
                schema_id,
                facet_type,
                field_name,
                facet_result_key(schema_id, facet_type, field_name),
                "facet_result",
            )
            .await
        {
            Some(CachePayload::FacetResult {
                facet_type: stored_type,
                field_name: stored_field,
                data,
            }) if stored_type == facet_type && stored_field == field_name => Some(data),
            _ => None,
        }
    }

    /// Removes every facet entry of `schema_id` from both tiers.
    #[instrument(skip(self))]
    pub async fn invalidate_for_schema_change(
        &self,
        schema_id: i64,
        operation: MutationOperation,
    ) -> InvalidationReport {
        let persistent = if self.persistent.is_available() {
            let result = self.store.delete_facet_entries(schema_id).await;
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
            "Facet cache invalidated"
        );

        InvalidationReport {
            cache: FACET_CACHE,
            persistent,
            memory_removed,
        }
    }

    /// Drops computed facet results of every schema, keeping facet discovery.
    #[instrument(skip(self))]
    pub async fn invalidate_results(&self) -> InvalidationReport {
        let persistent = if self.persistent.is_available() {
            let result = self
                .store
                .delete_facet_entries_of_types(&FacetType::RESULTS)
                .await;
            self.persistent.delete_outcome("invalidate_results", None, result)
        } else {
            TierOutcome::Skipped
        };
        let memory_removed = self
            .memory
            .remove_where(|_, entry| matches!(entry.payload, CachePayload::FacetResult { .. }));

        debug!(
            persistent = persistent.label(),
            persistent_removed = persistent.removed(),
            memory_removed,
            "Facet results invalidated"
        );

        InvalidationReport {
            cache: FACET_CACHE,
            persistent,
            memory_removed,
        }
    }

    #[instrument(skip(self))]
    pub async fn clear_all_caches(&self) -> InvalidationReport {
        let persistent = if self.persistent.is_available() {
            let result = self.store.delete_all_facet_entries().await;
            self.persistent.delete_outcome("clear_all", None, result)
        } else {
            TierOutcome::Skipped
        };
        let memory_removed = self.memory.clear();

        info!(
            persistent = persistent.label(),
            persistent_removed = persistent.removed(),
            memory_removed,
            "Facet cache cleared"
        );

        InvalidationReport {
            cache: FACET_CACHE,
            persistent,
            memory_removed,
        }
    }

    pub fn clear_memory(&self) -> usize {
        let removed = self.memory.clear();
        debug!(removed, "Facet memory tier cleared");
        removed
    }

    /// Deletes persisted rows whose expiry has passed.
    pub async fn clean_expired_entries(&self) -> u64 {
        let now = OffsetDateTime::now_utc();
        let memory_removed = self.memory.remove_where(|_, entry| entry.is_expired(now));
        if memory_removed > 0 {
            debug!(memory_removed, "Expired facet memory entries dropped");
        }

        if !self.persistent.is_available() {
            return 0;
        }
        match self.store.delete_expired_facet_entries(now).await {
            Ok(removed) => removed,
            Err(err) => {
                self.persistent.report_error("sweep", None, &err);
                0
            }
        }
    }

    pub async fn get_cache_statistics(&self) -> FacetCacheStatistics {
        let started = Instant::now();
        let counts = if self.persistent.is_available() {
            self.store.facet_entry_counts().await
        } else {
            Ok(Default::default())
        };
        let query_time = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_CACHE_STATS_QUERY_MS, "cache" => FACET_CACHE).record(query_time);

        let (counts, error) = match counts {
            Ok(counts) => (counts, None),
            Err(err) => {
                self.persistent.report_error("statistics", None, &err);
                (Default::default(), Some(err.to_string()))
            }
        };

        let by_type: BTreeMap<String, u64> = counts
            .by_type
            .into_iter()
            .map(|(facet_type, count)| (facet_type.as_str().to_string(), count))
            .collect();

        FacetCacheStatistics {
            total_entries: counts.total,
            by_type,
            memory_cache_size: self.memory.len(),
            cache_table: self.store.facet_cache_table().to_string(),
            query_time,
            timestamp: OffsetDateTime::now_utc(),
            error,
        }
    }

    async fn lookup(
        &self,
        schema_id: i64,
        facet_type: FacetType,
        field_name: &str,
        memory_key: String,
        expected: &'static str,
    ) -> Option<CachePayload> {
        let now = OffsetDateTime::now_utc();

        if self.memory.is_enabled() {
            if let Some(payload) = self.memory.get_at(&memory_key, now) {
                record_lookup(FACET_CACHE, "memory", "hit");
                debug!(schema_id, key = %memory_key, tier = "memory", "Facet cache hit");
                return Some(payload);
            }
            record_lookup(FACET_CACHE, "memory", "miss");
        }

        if !self.persistent.is_available() {
            return None;
        }

        let entry = match self
            .store
            .find_facet_entry(schema_id, facet_type, field_name, now)
            .await
        {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                record_lookup(FACET_CACHE, "persistent", "miss");
                return None;
            }
            Err(err) => {
                self.persistent.report_error("get", Some(schema_id), &err);
                return None;
            }
        };

        match CachePayload::decode(&memory_key, &entry.cache_data, expected) {
            Ok(payload) => {
                record_lookup(FACET_CACHE, "persistent", "hit");
                debug!(schema_id, key = %memory_key, tier = "persistent", "Facet cache hit");
                self.memory.insert(
                    memory_key,
                    MemoryEntry::new(Some(schema_id), payload.clone(), entry.expires_at),
                );
                Some(payload)
            }
            Err(err) => {
                record_lookup(FACET_CACHE, "persistent", "corrupt");
                error!(
                    schema_id,
                    key = %memory_key,
                    error = %err,
                    "Discarding undecodable facet cache entry"
                );
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn write(
        &self,
        schema_id: i64,
        facet_type: FacetType,
        field_name: &str,
        config: Option<&Value>,
        payload: CachePayload,
        memory_key: String,
        ttl: Duration,
    ) {
        let now = OffsetDateTime::now_utc();
        let Some(expires_at) = expiry(now, ttl) else {
            warn!(schema_id, key = %memory_key, "Facet entry not cached: expiry out of range");
            return;
        };

        if self.persistent.is_available() {
            let encoded = payload.encode().and_then(|cache_data| {
                let facet_config = config.map(serde_json::to_string).transpose()?;
                Ok((cache_data, facet_config))
            });
            match encoded {
                Ok((cache_data, facet_config)) => {
                    let entry = UpsertFacetCacheEntry {
                        schema_id,
                        facet_type,
                        field_name: field_name.to_string(),
                        facet_config,
                        cache_data,
                        expires_at: Some(expires_at),
                        now,
                    };
                    if let Err(err) = self.store.upsert_facet_entry(&entry).await {
                        self.persistent.report_error("put", Some(schema_id), &err);
                    }
                }
                Err(err) => {
                    error!(schema_id, key = %memory_key, error = %err, "Facet entry not encodable");
                    return;
                }
            }
        }

        if let Some(evicted) = self.memory.insert(
            memory_key,
            MemoryEntry::new(Some(schema_id), payload, Some(expires_at)),
        ) {
            debug!(evicted = %evicted, "Facet memory tier evicted entry");
        }
    }
}
