//! Invalidation coordinator.
//!
//! Turns committed mutations into removals across the schema and facet caches.
//! Invalidation runs inline, after the mutation and before control returns to
//! the caller, so a process always reads its own writes.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, instrument, warn};

use crate::domain::entities::SchemaRecord;
use crate::domain::types::MutationOperation;

use super::events::{
    InvalidationEvent, InvalidationOutcome, InvalidationPlan, InvalidationReport, TierOutcome,
};
use super::facet::FacetCache;
use super::schema::{SCHEMA_CACHE, SchemaCache};
use super::tier::METRIC_CACHE_INVALIDATION_TOTAL;

/// Entry point for write paths that need cached schema state dropped.
///
/// ```ignore
/// // After a schema update has been committed:
/// invalidator.schema_saved(&schema, MutationOperation::Update).await;
/// ```
pub struct CacheInvalidator {
    schema: Arc<SchemaCache>,
    facet: Arc<FacetCache>,
}

impl CacheInvalidator {
    pub fn new(schema: Arc<SchemaCache>, facet: Arc<FacetCache>) -> Self {
        Self { schema, facet }
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schema
    }

    pub fn facet_cache(&self) -> &Arc<FacetCache> {
        &self.facet
    }

    /// Applies the removals planned for `event`.
    ///
    /// Never fails: store errors are logged with the event context and reported
    /// through `InvalidationOutcome::FailedLogged`. Nothing is retried.
    #[instrument(
        skip(self, event),
        fields(
            event_id = %event.id,
            operation = %event.operation,
            scope_id = event.scope_id,
            register_id = event.register_id
        )
    )]
    pub async fn invalidate(&self, event: InvalidationEvent) -> InvalidationOutcome {
        let plan = InvalidationPlan::from_event(&event);
        let operation = event.operation;

        let reports = match plan {
            InvalidationPlan::Schema(schema_id) => vec![
                self.schema.invalidate(schema_id, operation).await,
                self.facet
                    .invalidate_for_schema_change(schema_id, operation)
                    .await,
            ],
            InvalidationPlan::BroadObjects => vec![
                InvalidationReport {
                    cache: SCHEMA_CACHE,
                    persistent: TierOutcome::Skipped,
                    memory_removed: self.schema.clear_memory(),
                },
                self.facet.invalidate_results().await,
            ],
            InvalidationPlan::BroadStructural => vec![
                self.schema.clear_all().await,
                self.facet.clear_all_caches().await,
            ],
        };

        let outcome = InvalidationOutcome::from_reports(reports);
        counter!(
            METRIC_CACHE_INVALIDATION_TOTAL,
            "plan" => plan.label(),
            "result" => if outcome.is_success() { "succeeded" } else { "failed" }
        )
        .increment(1);

        if outcome.is_success() {
            info!(
                plan = %plan,
                affected = event.affected,
                memory_removed = outcome.memory_removed(),
                "Cache invalidation succeeded"
            );
        } else {
            let failures: Vec<String> = outcome
                .reports()
                .iter()
                .filter_map(|report| {
                    report
                        .failure()
                        .map(|reason| format!("{}: {reason}", report.cache))
                })
                .collect();
            warn!(
                plan = %plan,
                affected = event.affected,
                memory_removed = outcome.memory_removed(),
                failures = ?failures,
                "Cache invalidation failed; persisted entries stay until expiry"
            );
        }

        outcome
    }

    /// Drops every cached artifact of one schema.
    pub async fn invalidate_for_schema_change(
        &self,
        schema_id: i64,
        operation: MutationOperation,
    ) -> InvalidationOutcome {
        self.invalidate(InvalidationEvent::new(operation, Some(schema_id)))
            .await
    }

    /// Invalidation for mutations whose schema scope is unknown.
    ///
    /// A present `schema_id` narrows this to a scoped invalidation.
    pub async fn invalidate_broadly(
        &self,
        register_id: Option<i64>,
        schema_id: Option<i64>,
        operation: MutationOperation,
    ) -> InvalidationOutcome {
        self.invalidate(InvalidationEvent::new(operation, schema_id).with_register(register_id))
            .await
    }

    /// Invalidates `schema` and caches its new state.
    pub async fn schema_saved(
        &self,
        schema: &SchemaRecord,
        operation: MutationOperation,
    ) -> InvalidationOutcome {
        let outcome = self
            .invalidate(
                InvalidationEvent::new(operation, Some(schema.id)).with_register(schema.register_id),
            )
            .await;
        self.schema.put(schema, None).await;
        outcome
    }

    pub async fn schema_deleted(&self, schema_id: i64) -> InvalidationOutcome {
        self.invalidate_for_schema_change(schema_id, MutationOperation::Delete)
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::testing::{Failure, FakeStore, schema};
    use crate::domain::types::FacetType;

    fn invalidator(store: &Arc<FakeStore>) -> CacheInvalidator {
        let config = CacheConfig::default();
        CacheInvalidator::new(
            Arc::new(SchemaCache::new(config.clone(), store.clone(), store.clone())),
            Arc::new(FacetCache::new(config, store.clone())),
        )
    }

    #[tokio::test]
    async fn schema_change_clears_both_caches_for_the_scope() {
        let store = Arc::new(FakeStore::new());
        let invalidator = invalidator(&store);
        invalidator.schema_cache().put(&schema(7), None).await;
        invalidator
            .facet_cache()
            .cache_facetable_fields(7, Default::default(), None)
            .await;

        let outcome = invalidator
            .invalidate_for_schema_change(7, MutationOperation::Update)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.memory_removed(), 4);
        assert_eq!(store.schema_row_count(), 0);
        assert_eq!(store.facet_row_count(), 0);
    }

    #[tokio::test]
    async fn schema_saved_recaches_new_state() {
        let store = Arc::new(FakeStore::new());
        let invalidator = invalidator(&store);
        let mut record = schema(3);
        invalidator.schema_cache().put(&record, None).await;

        record.title = "Renamed".to_string();
        invalidator
            .schema_saved(&record, MutationOperation::Update)
            .await;

        let cached = invalidator
            .schema_cache()
            .get(3)
            .await
            .expect("lookup")
            .expect("cached");
        assert_eq!(cached.title, "Renamed");
    }

    #[tokio::test]
    async fn broad_object_invalidation_keeps_persisted_schemas() {
        let store = Arc::new(FakeStore::new());
        let invalidator = invalidator(&store);
        invalidator.schema_cache().put(&schema(1), None).await;
        invalidator
            .facet_cache()
            .cache_facet_result(1, FacetType::Terms, "status", None, json!([]), None)
            .await;

        let outcome = invalidator
            .invalidate_broadly(Some(2), None, MutationOperation::BulkSave)
            .await;

        assert!(outcome.is_success());
        assert!(invalidator.schema_cache().memory().is_empty());
        assert_eq!(store.schema_row_count(), 3);
        assert_eq!(store.facet_row_count(), 0);
    }

    #[tokio::test]
    async fn broad_structural_invalidation_clears_everything() {
        let store = Arc::new(FakeStore::new());
        let invalidator = invalidator(&store);
        invalidator.schema_cache().put(&schema(1), None).await;
        invalidator
            .facet_cache()
            .cache_facetable_fields(1, Default::default(), None)
            .await;

        invalidator
            .invalidate_broadly(None, None, MutationOperation::Delete)
            .await;

        assert_eq!(store.schema_row_count(), 0);
        assert_eq!(store.facet_row_count(), 0);
        assert!(invalidator.facet_cache().memory().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_logged_not_raised() {
        let store = Arc::new(FakeStore::new());
        let invalidator = invalidator(&store);
        invalidator.schema_cache().put(&schema(4), None).await;
        store.fail_with(Some(Failure::Unavailable));

        let outcome = invalidator.schema_deleted(4).await;

        assert!(!outcome.is_success());
        assert!(invalidator.schema_cache().memory().is_empty());
        assert_eq!(outcome.reports().len(), 2);
    }
}
