use std::{process, sync::Arc, time::Duration};

use regcache::{
    application::{
        error::AppError,
        repos::{RepoError, SchemaRepo},
    },
    cache::{CacheConfig, CacheServices},
    config::{self, Command, InvalidateArgs, SweepArgs, WarmArgs},
    domain::types::MutationOperation,
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let repositories = init_repositories(&settings).await?;

    match cli_args.command {
        Command::Migrate => run_migrate(&repositories).await,
        Command::Stats => run_stats(&settings, repositories).await,
        Command::Sweep(args) => run_sweep(&settings, repositories, args).await,
        Command::Clear => run_clear(&settings, repositories).await,
        Command::Invalidate(args) => run_invalidate(&settings, repositories, args).await,
        Command::Warm(args) => run_warm(&settings, repositories, args).await,
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let repositories = PostgresRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(repositories))
}

async fn start_caches(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
) -> CacheServices {
    CacheServices::start(CacheConfig::from(&settings.cache), repositories).await
}

async fn run_migrate(repositories: &PostgresRepositories) -> Result<(), AppError> {
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;
    info!(target = "regcache::migrate", "Migrations applied");
    Ok(())
}

async fn run_stats(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
) -> Result<(), AppError> {
    let caches = start_caches(settings, repositories).await;
    let stats = caches.reporter().collect().await;
    print_json(&stats)
}

async fn run_sweep(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    args: SweepArgs,
) -> Result<(), AppError> {
    let caches = start_caches(settings, repositories).await;
    let sweeper = caches.sweeper();

    match args.interval_seconds {
        None => print_json(&sweeper.sweep().await),
        Some(0) => Err(AppError::validation(
            "--interval-seconds must be greater than zero",
        )),
        Some(seconds) => {
            info!(
                target = "regcache::sweep",
                interval_seconds = seconds,
                "Starting periodic sweep"
            );
            sweeper
                .run_every(Duration::from_secs(seconds), shutdown_signal())
                .await;
            Ok(())
        }
    }
}

async fn run_clear(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
) -> Result<(), AppError> {
    let caches = start_caches(settings, repositories).await;
    let schema = caches.schema.clear_all().await;
    let facet = caches.facet.clear_all_caches().await;

    let failures: Vec<String> = [&schema, &facet]
        .into_iter()
        .filter_map(|report| {
            report
                .failure()
                .map(|reason| format!("{}: {reason}", report.cache))
        })
        .collect();
    if !failures.is_empty() {
        return Err(AppError::unexpected(format!(
            "cache clear incomplete: {}",
            failures.join("; ")
        )));
    }

    info!(
        target = "regcache::clear",
        schema_removed = schema.persistent.removed(),
        facet_removed = facet.persistent.removed(),
        "Caches cleared"
    );
    Ok(())
}

async fn run_invalidate(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    args: InvalidateArgs,
) -> Result<(), AppError> {
    let caches = start_caches(settings, repositories).await;
    let operation = MutationOperation::from(args.operation);

    let outcome = caches
        .invalidator()
        .invalidate_broadly(args.register_id, args.schema_id, operation)
        .await;

    if outcome.is_success() {
        Ok(())
    } else {
        Err(AppError::unexpected(
            "cache invalidation failed; persisted entries stay until expiry",
        ))
    }
}

#[derive(Debug, Serialize)]
struct WarmSummary {
    warmed: Vec<i64>,
    missing: Vec<i64>,
}

async fn run_warm(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    args: WarmArgs,
) -> Result<(), AppError> {
    let caches = start_caches(settings, repositories.clone()).await;
    let ttl = args.ttl_seconds.map(Duration::from_secs);

    let mut summary = WarmSummary {
        warmed: Vec::new(),
        missing: Vec::new(),
    };
    for schema_id in args.schema_ids {
        match repositories.find_schema(schema_id).await {
            Ok(schema) => {
                caches.schema.put(&schema, ttl).await;
                summary.warmed.push(schema_id);
            }
            Err(RepoError::NotFound) => {
                warn!(target = "regcache::warm", schema_id, "Schema not found");
                summary.missing.push(schema_id);
            }
            Err(err) => return Err(err.into()),
        }
    }

    print_json(&summary)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
