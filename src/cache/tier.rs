//! Shared plumbing for the persistent tier of both caches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::application::repos::RepoError;

use super::events::TierOutcome;

pub const METRIC_CACHE_LOOKUP_TOTAL: &str = "regcache_cache_lookup_total";
pub const METRIC_CACHE_STORE_ERROR_TOTAL: &str = "regcache_cache_store_error_total";
pub const METRIC_CACHE_INVALIDATION_TOTAL: &str = "regcache_cache_invalidation_total";
pub const METRIC_CACHE_SWEEP_REMOVED_TOTAL: &str = "regcache_cache_sweep_removed_total";
pub const METRIC_CACHE_STATS_QUERY_MS: &str = "regcache_cache_stats_query_ms";

/// Availability of a persistent cache table.
///
/// Starts as configured and is narrowed once by the startup probe; call sites
/// consult it instead of discovering a missing table on every statement.
pub(crate) struct PersistentTier {
    cache: &'static str,
    available: AtomicBool,
}

impl PersistentTier {
    pub(crate) fn new(cache: &'static str, enabled: bool) -> Self {
        Self {
            cache,
            available: AtomicBool::new(enabled),
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Applies the result of a table presence check.
    pub(crate) fn apply_probe(&self, table: &str, probe: Result<bool, RepoError>) -> bool {
        if !self.is_available() {
            return false;
        }
        match probe {
            Ok(true) => {
                debug!(cache = self.cache, table, "Persistent cache table present");
                true
            }
            Ok(false) => {
                warn!(
                    cache = self.cache,
                    table,
                    "Persistent cache table missing; running memory-only until restart"
                );
                self.available.store(false, Ordering::Release);
                false
            }
            Err(err) => {
                // Tier stays enabled; individual calls fail open.
                warn!(
                    cache = self.cache,
                    table,
                    error = %err,
                    "Persistent cache table probe failed"
                );
                true
            }
        }
    }

    /// Logs a persistent-tier failure at the level its kind deserves.
    pub(crate) fn report_error(&self, op: &'static str, scope_id: Option<i64>, err: &RepoError) {
        if err.is_missing_table() {
            debug!(
                cache = self.cache,
                op,
                scope_id,
                error = %err,
                "Persistent cache table missing; treating as no-op"
            );
        } else {
            warn!(
                cache = self.cache,
                op,
                scope_id,
                error = %err,
                "Persistent cache operation failed"
            );
        }
        counter!(
            METRIC_CACHE_STORE_ERROR_TOTAL,
            "cache" => self.cache,
            "op" => op,
            "kind" => if err.is_missing_table() { "missing_table" } else { "store" }
        )
        .increment(1);
    }

    /// Folds a delete result into a `TierOutcome`, logging failures.
    pub(crate) fn delete_outcome(
        &self,
        op: &'static str,
        scope_id: Option<i64>,
        result: Result<u64, RepoError>,
    ) -> TierOutcome {
        match result {
            Ok(removed) => TierOutcome::Removed(removed),
            Err(err) => {
                self.report_error(op, scope_id, &err);
                if err.is_missing_table() {
                    TierOutcome::MissingTable
                } else {
                    TierOutcome::Failed(err.to_string())
                }
            }
        }
    }
}

/// Expiry of a write made at `now`; `None` when it is not representable.
pub(crate) fn expiry(now: OffsetDateTime, ttl: Duration) -> Option<OffsetDateTime> {
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
}

pub(crate) fn record_lookup(cache: &'static str, tier: &'static str, result: &'static str) {
    counter!(
        METRIC_CACHE_LOOKUP_TOTAL,
        "cache" => cache,
        "tier" => tier,
        "result" => result
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_table_disables_tier() {
        let tier = PersistentTier::new("schema", true);
        assert!(!tier.apply_probe("schema_cache", Ok(false)));
        assert!(!tier.is_available());
    }

    #[test]
    fn probe_error_keeps_tier_available() {
        let tier = PersistentTier::new("schema", true);
        assert!(tier.apply_probe(
            "schema_cache",
            Err(RepoError::from_persistence("connection refused"))
        ));
        assert!(tier.is_available());
    }

    #[test]
    fn disabled_tier_stays_disabled() {
        let tier = PersistentTier::new("facet", false);
        assert!(!tier.apply_probe("facet_cache", Ok(true)));
    }

    #[test]
    fn delete_outcome_classifies_errors() {
        let tier = PersistentTier::new("schema", true);
        assert_eq!(
            tier.delete_outcome("invalidate", Some(1), Ok(4)),
            TierOutcome::Removed(4)
        );
        assert_eq!(
            tier.delete_outcome(
                "invalidate",
                Some(1),
                Err(RepoError::missing_table("schema_cache"))
            ),
            TierOutcome::MissingTable
        );
        assert!(matches!(
            tier.delete_outcome("invalidate", Some(1), Err(RepoError::Timeout)),
            TierOutcome::Failed(_)
        ));
    }

    #[test]
    fn expiry_is_none_when_unrepresentable() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            expiry(now, Duration::from_secs(60)),
            Some(now + time::Duration::seconds(60))
        );
        assert!(expiry(now, Duration::MAX).is_none());

        let last = time::PrimitiveDateTime::MAX.assume_utc();
        assert!(expiry(last, Duration::from_secs(1)).is_none());
    }
}
