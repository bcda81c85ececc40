use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;

use mvn_sync::load_config::{load_config, resolve_config_path, CONFIG_ENV};
use serial_test::serial;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).expect("write config");
    file
}

fn clear_credentials() {
    env::remove_var("AWS_ACCESS_KEY_ID");
    env::remove_var("AWS_SECRET_ACCESS_KEY");
    env::remove_var("AWS_SESSION_TOKEN");
}

/// A complete static config plus credentials from the environment.
#[test]
#[serial]
fn test_load_config_full_with_env_credentials() {
    let file = config_file(
        r#"
store:
  bucket: maven-prod
  endpoint: https://s3.eu-west-1.amazonaws.com
  region: eu-west-1
  ga_prefix: releases
  early_access_prefix: preview/all
engine:
  concurrency: 8
  operation_timeout_secs: 30
ignore_patterns:
  - ".*\\.md5"
  - ".*/_remote\\.repositories"
"#,
    );
    env::set_var("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE");
    env::set_var("AWS_SECRET_ACCESS_KEY", "secret");
    env::set_var("AWS_SESSION_TOKEN", "session");

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.store.bucket, "maven-prod");
    assert_eq!(config.store.region, "eu-west-1");
    assert_eq!(config.prefix(true), "releases");
    assert_eq!(config.prefix(false), "preview/all");
    assert_eq!(config.engine.concurrency, 8);
    assert_eq!(config.engine.operation_timeout, Duration::from_secs(30));
    assert_eq!(config.ignore_patterns.len(), 2);
    let credentials = config.require_credentials().expect("credentials present");
    assert_eq!(credentials.access_key_id, "AKIDEXAMPLE");
    assert_eq!(credentials.session_token.as_deref(), Some("session"));

    clear_credentials();
}

#[test]
#[serial]
fn test_load_config_defaults_without_credentials() {
    let file = config_file("store:\n  bucket: maven\n  endpoint: http://localhost:9000\n");
    clear_credentials();

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.store.region, "us-east-1");
    assert_eq!(config.prefix(true), "ga");
    assert_eq!(config.prefix(false), "earlyaccess/all");
    assert_eq!(config.engine, mvn_sync_core::EngineConfig::default());
    assert!(config.ignore_patterns.is_empty());
    assert!(config.credentials.is_none());
    let err = config.require_credentials().unwrap_err();
    assert!(err.to_string().contains("AWS_ACCESS_KEY_ID"));
}

#[test]
#[serial]
fn test_load_config_rejects_missing_store_section() {
    let file = config_file("engine:\n  concurrency: 4\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"), "{err}");
}

#[test]
#[serial]
fn test_resolve_config_path_precedence() {
    env::set_var(CONFIG_ENV, "/etc/mvn-sync/from-env.yaml");
    let explicit = resolve_config_path(Some(PathBuf::from("/tmp/explicit.yaml"))).expect("explicit");
    assert_eq!(explicit, PathBuf::from("/tmp/explicit.yaml"));
    let from_env = resolve_config_path(None).expect("from env");
    assert_eq!(from_env, PathBuf::from("/etc/mvn-sync/from-env.yaml"));

    env::remove_var(CONFIG_ENV);
    let home = env::var("HOME").ok();
    env::set_var("HOME", "/home/builder");
    let default = resolve_config_path(None).expect("default");
    assert_eq!(default, PathBuf::from("/home/builder/.mvn-sync/config.yaml"));
    if let Some(home) = home {
        env::set_var("HOME", home);
    }
}
