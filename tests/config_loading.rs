use std::io::Write;

use stepgraph_core::config::{AppConfig, StoreBackend};
use stepgraph_core::error::FlowError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
default_max_steps = 50
tool_timeout_secs = 10
event_capacity = 1024

[store]
backend = "sqlite"
path = "/tmp/stepgraph-test.db"

[gateway]
bind = "0.0.0.0:9999"

[log]
enabled = true
dir = "/tmp/stepgraph-logs"
level = 3
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.default_max_steps, 50);
    assert_eq!(config.engine.tool_timeout_secs, 10);
    assert_eq!(config.engine.event_capacity, 1024);
    assert_eq!(config.store.backend, StoreBackend::Sqlite);
    assert_eq!(config.store.path, "/tmp/stepgraph-test.db");

    let gw = config.gateway.expect("gateway present");
    assert_eq!(gw.bind, "0.0.0.0:9999");

    let log = config.log.expect("log present");
    assert!(log.enabled);
    assert_eq!(log.level, 3);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("STEPGRAPH_TEST_DB_PATH", "/var/lib/flows.db");

    let toml_content = r#"
[store]
backend = "sqlite"
path = "${STEPGRAPH_TEST_DB_PATH}"
"#;

    let tmp = stepgraph_test_utils::temp_config_file(toml_content);

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.store.path, "/var/lib/flows.db");

    std::env::remove_var("STEPGRAPH_TEST_DB_PATH");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[engine]
default_max_steps = 5
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.default_max_steps, 5);
    assert_eq!(config.engine.tool_timeout_secs, 30);
    assert_eq!(config.engine.event_capacity, 256);
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.store.path, "stepgraph.db");
    assert!(config.gateway.is_none());
    assert_eq!(config.gateway_or_default().bind, "127.0.0.1:8000");
    assert!(config.log.is_none());
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("absent.toml");

    assert!(matches!(
        AppConfig::load(&path),
        Err(FlowError::ConfigNotFound(_))
    ));

    let config = AppConfig::load_or_default(&path).expect("defaults");
    assert_eq!(config.engine.default_max_steps, 20);
}

#[test]
fn test_malformed_config_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine\ndefault_max_steps = ").expect("write toml");

    let err = AppConfig::load_or_default(tmp.path()).unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));
}

#[test]
fn test_example_config_parses() {
    let config = AppConfig::parse(include_str!("../stepgraph.toml.example")).expect("parse example");
    assert_eq!(config.engine.default_max_steps, 20);
    assert_eq!(config.log.expect("log section").dir, "logs");
}
