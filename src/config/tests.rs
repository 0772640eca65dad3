use super::*;
use crate::domain::types::MutationOperation;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.cache.default_ttl_secs = Some(600);

    let overrides = GlobalOverrides {
        log_level: Some("debug".to_string()),
        cache_default_ttl_seconds: Some(900),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.default_ttl_secs, 900);
}

#[test]
fn cache_defaults_match_cache_config() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let config = CacheConfig::from(&settings.cache);
    let defaults = CacheConfig::default();

    assert_eq!(config.default_ttl_secs, defaults.default_ttl_secs);
    assert_eq!(config.max_ttl_secs, 28_800);
    assert_eq!(config.facet_config_ttl_secs, 7200);
    assert_eq!(config.facet_result_ttl_secs, 1800);
    assert!(config.enable_memory_tier && config.enable_persistent_tier);
}

#[test]
fn ttl_above_ceiling_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.default_ttl_secs = Some(100_000);

    let err = Settings::from_raw(raw).expect_err("ttl over ceiling");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.default_ttl_secs",
            ..
        }
    ));
}

#[test]
fn max_ttl_above_eight_hours_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_ttl_secs = Some(100_000);

    let err = Settings::from_raw(raw).expect_err("ceiling over eight hours");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_ttl_secs",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.max_ttl_secs = Some(u64::MAX);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn zero_memory_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.facet_memory_limit = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero limit");
    assert!(err.to_string().contains("cache.facet_memory_limit"));
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.max_connections.get(), 5);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn persistent_tier_can_be_disabled_from_cli() {
    let args = CliArgs::parse_from(["regcache", "stats", "--cache-persistent-tier", "false"]);
    let mut raw = RawSettings::default();
    raw.apply_overrides(&args.overrides);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(!settings.cache.enable_persistent_tier);
    assert!(matches!(args.command, Command::Stats));
}

#[test]
fn parse_sweep_interval() {
    let args = CliArgs::parse_from(["regcache", "sweep", "--interval-seconds", "300"]);

    match args.command {
        Command::Sweep(sweep) => assert_eq!(sweep.interval_seconds, Some(300)),
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_invalidate_arguments() {
    let args = CliArgs::parse_from([
        "regcache",
        "--database-url",
        "postgres://example",
        "invalidate",
        "--register-id",
        "2",
        "--operation",
        "bulk_save",
    ]);

    assert_eq!(
        args.overrides.database_url.as_deref(),
        Some("postgres://example")
    );
    match args.command {
        Command::Invalidate(invalidate) => {
            assert_eq!(invalidate.schema_id, None);
            assert_eq!(invalidate.register_id, Some(2));
            assert_eq!(
                MutationOperation::from(invalidate.operation),
                MutationOperation::BulkSave
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn invalidate_defaults_to_update() {
    let args = CliArgs::parse_from(["regcache", "invalidate", "--schema-id", "7"]);

    match args.command {
        Command::Invalidate(invalidate) => {
            assert_eq!(invalidate.schema_id, Some(7));
            assert_eq!(invalidate.operation, OperationArg::Update);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_warm_arguments() {
    let args = CliArgs::parse_from([
        "regcache",
        "warm",
        "--schema-id",
        "1",
        "2",
        "--ttl-seconds",
        "120",
    ]);

    match args.command {
        Command::Warm(warm) => {
            assert_eq!(warm.schema_ids, vec![1, 2]);
            assert_eq!(warm.ttl_seconds, Some(120));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn subcommand_is_required() {
    assert!(CliArgs::try_parse_from(["regcache"]).is_err());
}
