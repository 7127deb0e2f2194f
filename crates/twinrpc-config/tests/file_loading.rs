//! Loading configuration files from disk.

use std::io::Write;
use twinrpc_config::{ConfigError, ConfigLoader, LogFormat};

fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_complete_toml_file() {
    let file = write_file(
        ".toml",
        r#"
            [server]
            http_addr = "127.0.0.1:4100"
            request_timeout_ms = 5000
            max_body_bytes = 1048576

            [telemetry]
            service_name = "twin-demo"

            [telemetry.logging]
            level = "debug"
            format = "pretty"

            [security]
            enforce_contract_auth = true

            [quota]
            enabled = true
            limit = 10
            window_secs = 1

            [uploads]
            root = "/tmp/twin-uploads"
        "#,
    );

    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();

    assert_eq!(config.server.http_addr, "127.0.0.1:4100");
    assert_eq!(config.server.request_timeout_ms, 5000);
    assert_eq!(config.server.contract_prefix, "/rpc");
    assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    assert!(config.security.enforce_contract_auth);
    assert_eq!(config.quota.limit, 10);
    assert_eq!(config.uploads.root.to_str(), Some("/tmp/twin-uploads"));
}

#[test]
fn test_json_file() {
    let file = write_file(".json", r#"{"server": {"legacy_prefix": "/legacy"}}"#);
    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
    assert_eq!(config.server.legacy_prefix, "/legacy");
}

#[test]
fn test_unknown_field_in_file_fails() {
    let file = write_file(".toml", "[server]\nhttp2_enabled = true\n");
    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}

#[test]
fn test_invalid_value_in_file_fails_validation() {
    let file = write_file(".toml", "[server]\nhttp_addr = \"not-an-addr\"\n");
    let result = ConfigLoader::new().with_file(file.path()).unwrap().load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn test_unknown_extension_fails() {
    let file = write_file(".ini", "[server]\n");
    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
}
