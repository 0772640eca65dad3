//! Expiry sweeping and statistics reporting.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument};

use super::facet::{FACET_CACHE, FacetCache};
use super::schema::{SCHEMA_CACHE, SchemaCache};
use super::stats::CacheStatistics;
use super::tier::METRIC_CACHE_SWEEP_REMOVED_TOTAL;

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub schema_removed: u64,
    pub facet_removed: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.schema_removed + self.facet_removed
    }
}

/// Deletes expired rows from both cache tables.
///
/// Scheduling is up to the caller; `run_every` drives it on a fixed interval.
pub struct ExpirySweeper {
    schema: Arc<SchemaCache>,
    facet: Arc<FacetCache>,
}

impl ExpirySweeper {
    pub fn new(schema: Arc<SchemaCache>, facet: Arc<FacetCache>) -> Self {
        Self { schema, facet }
    }

    #[instrument(skip(self))]
    pub async fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            schema_removed: self.schema.sweep_expired().await,
            facet_removed: self.facet.clean_expired_entries().await,
        };

        counter!(METRIC_CACHE_SWEEP_REMOVED_TOTAL, "cache" => SCHEMA_CACHE)
            .increment(report.schema_removed);
        counter!(METRIC_CACHE_SWEEP_REMOVED_TOTAL, "cache" => FACET_CACHE)
            .increment(report.facet_removed);

        if report.total() > 0 {
            info!(
                schema_removed = report.schema_removed,
                facet_removed = report.facet_removed,
                "Expired cache entries swept"
            );
        } else {
            debug!("No expired cache entries");
        }
        report
    }

    /// Sweeps every `period` until `shutdown` resolves.
    pub async fn run_every<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = &mut shutdown => {
                    info!("Expiry sweeper stopping");
                    break;
                }
            }
        }
    }
}

/// Collects read-only statistics from both caches.
pub struct StatisticsReporter {
    schema: Arc<SchemaCache>,
    facet: Arc<FacetCache>,
}

impl StatisticsReporter {
    pub fn new(schema: Arc<SchemaCache>, facet: Arc<FacetCache>) -> Self {
        Self { schema, facet }
    }

    #[instrument(skip(self))]
    pub async fn collect(&self) -> CacheStatistics {
        CacheStatistics {
            schema: self.schema.statistics().await,
            facet: self.facet.get_cache_statistics().await,
        }
    }
}
