use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_INVALIDATION_TOTAL, METRIC_CACHE_LOOKUP_TOTAL, METRIC_CACHE_STATS_QUERY_MS,
    METRIC_CACHE_STORE_ERROR_TOTAL, METRIC_CACHE_SWEEP_REMOVED_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub(crate) fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_LOOKUP_TOTAL,
            Unit::Count,
            "Cache lookups by cache, tier and result."
        );
        describe_counter!(
            METRIC_CACHE_STORE_ERROR_TOTAL,
            Unit::Count,
            "Persistent cache operations that failed or hit a missing table."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATION_TOTAL,
            Unit::Count,
            "Invalidations by plan and result."
        );
        describe_counter!(
            METRIC_CACHE_SWEEP_REMOVED_TOTAL,
            Unit::Count,
            "Expired cache rows removed by the sweeper."
        );
        describe_histogram!(
            METRIC_CACHE_STATS_QUERY_MS,
            Unit::Milliseconds,
            "Cache statistics query latency in milliseconds."
        );
    });
}
