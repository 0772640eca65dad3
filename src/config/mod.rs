//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
#[cfg(test)]
mod tests;

use std::{num::NonZeroU32, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{CacheConfig, MAX_TTL_SECS};

pub use cli::{
    CliArgs, Command, GlobalOverrides, InvalidateArgs, OperationArg, SweepArgs, WarmArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "regcache";
const ENV_PREFIX: &str = "REGCACHE";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub enable_memory_tier: bool,
    pub enable_persistent_tier: bool,
    pub schema_memory_limit: usize,
    pub facet_memory_limit: usize,
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub facet_config_ttl_secs: u64,
    pub facet_result_ttl_secs: u64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_memory_tier {
            self.cache.enable_memory_tier = Some(enabled);
        }
        if let Some(enabled) = overrides.cache_persistent_tier {
            self.cache.enable_persistent_tier = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_secs = Some(ttl);
        }
        if let Some(ttl) = overrides.cache_max_ttl_seconds {
            self.cache.max_ttl_secs = Some(ttl);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = NonZeroU32::new(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    )
    .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let max_ttl_secs = positive(
        cache.max_ttl_secs.unwrap_or(defaults.max_ttl_secs),
        "cache.max_ttl_secs",
    )?;
    if max_ttl_secs > MAX_TTL_SECS {
        return Err(LoadError::invalid(
            "cache.max_ttl_secs",
            format!("must not exceed {MAX_TTL_SECS}"),
        ));
    }
    let ttl_within_max =
        |value: Option<u64>, default: u64, key: &'static str| -> Result<u64, LoadError> {
            let value = positive(value.unwrap_or(default), key)?;
            if value > max_ttl_secs {
                return Err(LoadError::invalid(
                    key,
                    format!("must not exceed cache.max_ttl_secs ({max_ttl_secs})"),
                ));
            }
            Ok(value)
        };

    let default_ttl_secs = ttl_within_max(
        cache.default_ttl_secs,
        defaults.default_ttl_secs,
        "cache.default_ttl_secs",
    )?;
    let facet_config_ttl_secs = ttl_within_max(
        cache.facet_config_ttl_secs,
        defaults.facet_config_ttl_secs,
        "cache.facet_config_ttl_secs",
    )?;
    let facet_result_ttl_secs = ttl_within_max(
        cache.facet_result_ttl_secs,
        defaults.facet_result_ttl_secs,
        "cache.facet_result_ttl_secs",
    )?;

    let schema_memory_limit = usize::try_from(positive(
        cache
            .schema_memory_limit
            .unwrap_or(defaults.schema_memory_limit as u64),
        "cache.schema_memory_limit",
    )?)
    .map_err(|_| {
        LoadError::invalid(
            "cache.schema_memory_limit",
            "value exceeds supported range for usize",
        )
    })?;
    let facet_memory_limit = usize::try_from(positive(
        cache
            .facet_memory_limit
            .unwrap_or(defaults.facet_memory_limit as u64),
        "cache.facet_memory_limit",
    )?)
    .map_err(|_| {
        LoadError::invalid(
            "cache.facet_memory_limit",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(CacheSettings {
        enable_memory_tier: cache
            .enable_memory_tier
            .unwrap_or(defaults.enable_memory_tier),
        enable_persistent_tier: cache
            .enable_persistent_tier
            .unwrap_or(defaults.enable_persistent_tier),
        schema_memory_limit,
        facet_memory_limit,
        default_ttl_secs,
        max_ttl_secs,
        facet_config_ttl_secs,
        facet_result_ttl_secs,
    })
}

fn positive(value: u64, key: &'static str) -> Result<u64, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_memory_tier: Option<bool>,
    enable_persistent_tier: Option<bool>,
    schema_memory_limit: Option<u64>,
    facet_memory_limit: Option<u64>,
    default_ttl_secs: Option<u64>,
    max_ttl_secs: Option<u64>,
    facet_config_ttl_secs: Option<u64>,
    facet_result_ttl_secs: Option<u64>,
}
