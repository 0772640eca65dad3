//! Cache configuration.
//!
//! Controls the memory and persistent tiers of the schema and facet caches via
//! the `[cache]` section of `regcache.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_SCHEMA_MEMORY_LIMIT: usize = 1000;
const DEFAULT_FACET_MEMORY_LIMIT: usize = 2000;
const DEFAULT_TTL_SECS: u64 = 60 * 60;
/// Hard ceiling for every TTL; `max_ttl_secs` can only lower it.
pub const MAX_TTL_SECS: u64 = 8 * 60 * 60;
const DEFAULT_FACET_CONFIG_TTL_SECS: u64 = 2 * 60 * 60;
const DEFAULT_FACET_RESULT_TTL_SECS: u64 = 30 * 60;

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Keep deserialized entries in process memory.
    pub enable_memory_tier: bool,
    /// Mirror entries into the shared cache tables.
    pub enable_persistent_tier: bool,
    /// Maximum entries in the schema cache memory tier.
    pub schema_memory_limit: usize,
    /// Maximum entries in the facet cache memory tier.
    pub facet_memory_limit: usize,
    /// TTL applied to schema artifacts when the caller supplies none.
    pub default_ttl_secs: u64,
    /// Ceiling applied to every caller-supplied TTL.
    pub max_ttl_secs: u64,
    /// Default TTL for facet discovery (`config`) entries.
    pub facet_config_ttl_secs: u64,
    /// Default TTL for computed facet results.
    pub facet_result_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_memory_tier: true,
            enable_persistent_tier: true,
            schema_memory_limit: DEFAULT_SCHEMA_MEMORY_LIMIT,
            facet_memory_limit: DEFAULT_FACET_MEMORY_LIMIT,
            default_ttl_secs: DEFAULT_TTL_SECS,
            max_ttl_secs: MAX_TTL_SECS,
            facet_config_ttl_secs: DEFAULT_FACET_CONFIG_TTL_SECS,
            facet_result_ttl_secs: DEFAULT_FACET_RESULT_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_memory_tier: settings.enable_memory_tier,
            enable_persistent_tier: settings.enable_persistent_tier,
            schema_memory_limit: settings.schema_memory_limit,
            facet_memory_limit: settings.facet_memory_limit,
            default_ttl_secs: settings.default_ttl_secs,
            max_ttl_secs: settings.max_ttl_secs,
            facet_config_ttl_secs: settings.facet_config_ttl_secs,
            facet_result_ttl_secs: settings.facet_result_ttl_secs,
        }
    }
}

impl CacheConfig {
    pub fn schema_memory_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.schema_memory_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn facet_memory_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.facet_memory_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs.min(MAX_TTL_SECS))
    }

    /// Resolves the TTL for a schema artifact write.
    pub fn schema_ttl(&self, requested: Option<Duration>) -> Duration {
        self.clamp_ttl(requested, self.default_ttl_secs)
    }

    pub fn facet_config_ttl(&self, requested: Option<Duration>) -> Duration {
        self.clamp_ttl(requested, self.facet_config_ttl_secs)
    }

    pub fn facet_result_ttl(&self, requested: Option<Duration>) -> Duration {
        self.clamp_ttl(requested, self.facet_result_ttl_secs)
    }

    /// Missing or zero TTLs fall back to `default_secs`; everything is capped at `max_ttl`.
    fn clamp_ttl(&self, requested: Option<Duration>, default_secs: u64) -> Duration {
        let ttl = requested
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(Duration::from_secs(default_secs));
        ttl.min(self.max_ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enable_memory_tier);
        assert!(config.enable_persistent_tier);
        assert_eq!(config.schema_memory_limit, 1000);
        assert_eq!(config.facet_memory_limit, 2000);
        assert_eq!(config.default_ttl_secs, 3600);
        assert_eq!(config.max_ttl_secs, 28_800);
        assert_eq!(config.facet_config_ttl_secs, 7200);
        assert_eq!(config.facet_result_ttl_secs, 1800);
    }

    #[test]
    fn caller_ttl_is_clamped_to_eight_hours() {
        let config = CacheConfig::default();
        let ttl = config.schema_ttl(Some(Duration::from_secs(100_000)));
        assert_eq!(ttl, Duration::from_secs(28_800));
    }

    #[test]
    fn configured_ceiling_cannot_exceed_eight_hours() {
        let config = CacheConfig {
            max_ttl_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.max_ttl(), Duration::from_secs(28_800));
        assert_eq!(
            config.schema_ttl(Some(Duration::from_secs(u64::MAX))),
            Duration::from_secs(28_800)
        );

        let lowered = CacheConfig {
            max_ttl_secs: 600,
            ..Default::default()
        };
        assert_eq!(
            lowered.facet_config_ttl(Some(Duration::from_secs(7200))),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn missing_or_zero_ttl_uses_default() {
        let config = CacheConfig::default();
        assert_eq!(config.schema_ttl(None), Duration::from_secs(3600));
        assert_eq!(config.schema_ttl(Some(Duration::ZERO)), Duration::from_secs(3600));
        assert_eq!(config.facet_config_ttl(None), Duration::from_secs(7200));
        assert_eq!(config.facet_result_ttl(None), Duration::from_secs(1800));
    }

    #[test]
    fn facet_config_outlives_facet_results_by_default() {
        let config = CacheConfig::default();
        assert!(config.facet_config_ttl(None) > config.facet_result_ttl(None));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            schema_memory_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.schema_memory_limit_non_zero().get(), 1);
    }
}
