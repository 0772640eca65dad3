use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;

use regcache::cache::testing::{Failure, FakeStore, schema};
use regcache::cache::{
    CacheConfig, CacheServices, METRIC_CACHE_INVALIDATION_TOTAL, METRIC_CACHE_LOOKUP_TOTAL,
    METRIC_CACHE_STATS_QUERY_MS, METRIC_CACHE_STORE_ERROR_TOTAL, METRIC_CACHE_SWEEP_REMOVED_TOTAL,
};
use regcache::domain::types::{FacetType, MutationOperation};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = Arc::new(FakeStore::new());
    store.insert_schema(schema(1));
    let caches = CacheServices::new(CacheConfig::default(), store.clone());

    // Lookup hit/miss across all tiers
    assert!(caches.schema.get(1).await.expect("lookup").is_some());
    assert!(caches.schema.get(1).await.expect("lookup").is_some());
    assert!(caches.schema.get(2).await.expect("lookup").is_none());
    caches
        .facet
        .cache_facet_result(1, FacetType::Terms, "status", None, json!([]), None)
        .await;
    assert!(
        caches
            .facet
            .get_facet_result(1, FacetType::Terms, "status")
            .await
            .is_some()
    );

    // Invalidation, sweep and statistics
    caches
        .invalidator()
        .invalidate_for_schema_change(1, MutationOperation::Update)
        .await;
    caches.sweeper().sweep().await;
    caches.reporter().collect().await;

    // Store errors
    store.fail_with(Some(Failure::Unavailable));
    caches.schema.put(&schema(3), None).await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        METRIC_CACHE_LOOKUP_TOTAL,
        METRIC_CACHE_STORE_ERROR_TOTAL,
        METRIC_CACHE_INVALIDATION_TOTAL,
        METRIC_CACHE_SWEEP_REMOVED_TOTAL,
        METRIC_CACHE_STATS_QUERY_MS,
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
