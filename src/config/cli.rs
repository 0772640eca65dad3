use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::domain::types::MutationOperation;

/// Command-line arguments for the regcache binary.
#[derive(Debug, Parser)]
#[command(name = "regcache", version, about = "Schema and facet cache maintenance")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "REGCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print statistics for both caches as JSON.
    Stats,
    /// Delete expired cache rows, once or on an interval.
    Sweep(SweepArgs),
    /// Remove every entry from both caches.
    Clear,
    /// Invalidate cached artifacts after an out-of-band change.
    Invalidate(InvalidateArgs),
    /// Load schemas from the authoritative store into both cache tiers.
    Warm(WarmArgs),
    /// Apply pending database migrations.
    Migrate,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SweepArgs {
    /// Keep sweeping every SECONDS until interrupted.
    #[arg(long = "interval-seconds", value_name = "SECONDS")]
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    /// Schema to invalidate; omit for a broad invalidation.
    #[arg(long = "schema-id", value_name = "ID")]
    pub schema_id: Option<i64>,

    /// Register the change happened in, for log context.
    #[arg(long = "register-id", value_name = "ID")]
    pub register_id: Option<i64>,

    /// Mutation that made the cache stale.
    #[arg(long, value_enum, default_value_t = OperationArg::Update)]
    pub operation: OperationArg,
}

#[derive(Debug, Args, Clone)]
pub struct WarmArgs {
    /// Schemas to load.
    #[arg(long = "schema-id", value_name = "ID", required = true, num_args = 1..)]
    pub schema_ids: Vec<i64>,

    /// TTL for the warmed entries; capped at the configured maximum.
    #[arg(long = "ttl-seconds", value_name = "SECONDS")]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum OperationArg {
    Create,
    Update,
    Delete,
    BulkSave,
    BulkDelete,
    BulkPublish,
    BulkDepublish,
}

impl From<OperationArg> for MutationOperation {
    fn from(value: OperationArg) -> Self {
        match value {
            OperationArg::Create => MutationOperation::Create,
            OperationArg::Update => MutationOperation::Update,
            OperationArg::Delete => MutationOperation::Delete,
            OperationArg::BulkSave => MutationOperation::BulkSave,
            OperationArg::BulkDelete => MutationOperation::BulkDelete,
            OperationArg::BulkPublish => MutationOperation::BulkPublish,
            OperationArg::BulkDepublish => MutationOperation::BulkDepublish,
        }
    }
}

/// Overrides accepted by every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT", global = true)]
    pub database_max_connections: Option<u32>,

    /// Toggle the process-local memory tier.
    #[arg(
        long = "cache-memory-tier",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_memory_tier: Option<bool>,

    /// Toggle the persistent cache tables.
    #[arg(
        long = "cache-persistent-tier",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_persistent_tier: Option<bool>,

    /// Override the default schema artifact TTL.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS", global = true)]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the TTL ceiling.
    #[arg(long = "cache-max-ttl-seconds", value_name = "SECONDS", global = true)]
    pub cache_max_ttl_seconds: Option<u64>,
}
