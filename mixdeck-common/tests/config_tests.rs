//! Tests for configuration resolution and graceful degradation
//!
//! Uses serial_test to prevent environment variable races: tests that touch
//! MIXDECK_CONFIG are marked #[serial] so they never run in parallel.

use mixdeck_common::config::{
    load_toml_config, resolve_config_path, ConfigSource, LoggingConfig, CONFIG_ENV_VAR,
};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SampleConfig {
    name: String,
    logging: LoggingConfig,
}

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let source = resolve_config_path(Some(PathBuf::from("/from/cli.toml").as_path()), CONFIG_ENV_VAR);
    assert_eq!(source, ConfigSource::CommandLine(PathBuf::from("/from/cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let source = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(source, ConfigSource::Environment(PathBuf::from("/from/env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_empty_environment_value_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");

    let source = resolve_config_path(None, CONFIG_ENV_VAR);
    assert!(!matches!(source, ConfigSource::Environment(_)));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_missing_explicit_file_falls_back_to_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("absent.toml");

    let loaded: mixdeck_common::config::Loaded<SampleConfig> =
        load_toml_config(ConfigSource::CommandLine(path.clone())).unwrap();

    assert_eq!(loaded.source, ConfigSource::Missing(path));
    assert_eq!(loaded.config.name, "");
    assert_eq!(loaded.config.logging.level, "info");
}

#[test]
fn test_file_values_loaded() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        "name = \"deck\"\n[logging]\nlevel = \"trace\"\nfile = \"/tmp/deck.log\"\n",
    )
    .unwrap();

    let loaded: mixdeck_common::config::Loaded<SampleConfig> =
        load_toml_config(ConfigSource::CommandLine(path)).unwrap();

    assert_eq!(loaded.config.name, "deck");
    assert_eq!(loaded.config.logging.level, "trace");
    assert_eq!(loaded.config.logging.file, Some(PathBuf::from("/tmp/deck.log")));
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "name = [unterminated").unwrap();

    let result: mixdeck_common::Result<mixdeck_common::config::Loaded<SampleConfig>> =
        load_toml_config(ConfigSource::CommandLine(path));

    match result {
        Err(mixdeck_common::Error::Config(msg)) => assert!(msg.contains("config.toml")),
        other => panic!("expected Config error, got {:?}", other.map(|l| l.source)),
    }
}

#[test]
fn test_defaults_source_uses_default_value() {
    let loaded: mixdeck_common::config::Loaded<SampleConfig> =
        load_toml_config(ConfigSource::Defaults).unwrap();
    assert_eq!(loaded.source, ConfigSource::Defaults);
    assert_eq!(loaded.config.logging, LoggingConfig::default());
}
