//! Loading configuration files from disk

use std::io::Write;

use assert_matches::assert_matches;
use sensu_bridge::{
    AlarmCallback, ConfigError, SensuCallback,
    config::{RABBITMQ_PASSWORD, RABBITMQ_PORT, RABBITMQ_USER, Severity, read_config_file},
};
use serde_json::json;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_minimal_file_is_completed_with_defaults() {
    let file = write_config(
        r#"{
            "rabbitmq_hostname": "rabbit.internal",
            "rabbitmq_password": "s3cret",
            "check_name": "[stream]",
            "check_client": "[source]"
        }"#,
    );

    let configuration = read_config_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(configuration.get_int(RABBITMQ_PORT), Some(5671));
    assert_eq!(configuration.get_string(RABBITMQ_USER), Some("sensu"));

    let callback = SensuCallback::initialize(configuration).unwrap();
    assert_eq!(callback.config().check_severity, Severity::Critical);
    assert_eq!(callback.config().check_handlers, "default");
    assert_eq!(callback.config().broker.virtual_host, "/sensu");
    assert_eq!(callback.attributes()[RABBITMQ_PASSWORD], json!("****"));
}

#[test]
fn test_file_values_override_defaults() {
    let file = write_config(
        r#"{
            "rabbitmq_hostname": "rabbit.internal",
            "rabbitmq_port": 5672,
            "rabbitmq_use_ssl": true,
            "check_name": "disk",
            "check_client": "web-1",
            "check_severity": "1"
        }"#,
    );

    let configuration = read_config_file(file.path().to_str().unwrap()).unwrap();
    let callback = SensuCallback::initialize(configuration).unwrap();

    assert_eq!(callback.config().broker.port, 5672);
    assert!(callback.config().broker.use_tls);
    assert_eq!(callback.config().check_severity, Severity::Warning);
}

#[test]
fn test_missing_hostname_is_reported_before_any_send() {
    let file = write_config(r#"{ "check_name": "disk", "check_client": "web-1" }"#);

    let configuration = read_config_file(file.path().to_str().unwrap()).unwrap();
    let err = SensuCallback::initialize(configuration).unwrap_err();
    assert_eq!(err.field(), Some("rabbitmq_hostname"));
}

#[test]
fn test_malformed_file_is_a_load_error() {
    let file = write_config("{ not json");
    let err = read_config_file(file.path().to_str().unwrap()).unwrap_err();
    assert_matches!(err, ConfigError::Load(_));
}

#[test]
fn test_missing_file_is_a_load_error() {
    let err = read_config_file("/nonexistent/sensu-bridge.json").unwrap_err();
    assert_matches!(err, ConfigError::Load(_));
}
