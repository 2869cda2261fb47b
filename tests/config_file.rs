use passport_capture::config::Config;
use passport_capture::error::ConfigError;
use std::fs;
use tempfile::TempDir;

#[test]
fn loads_values_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[server]
port = 4100

[idempotency]
result_ttl_secs = 3600
lock_ttl_secs = 120

[logging]
dir = "/var/log/passport"

[metrics]
enabled = true
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.server.port, 4100);
    assert_eq!(config.idempotency.result_ttl_secs, 3600);
    assert_eq!(config.idempotency.lock_ttl_secs, 120);
    assert_eq!(config.logging.dir.to_str(), Some("/var/log/passport"));
    assert!(config.metrics.enabled);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.gate_settings(), Config::default().gate_settings());
}

#[test]
fn malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[server\nport = ").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
}

#[test]
fn zero_lock_ttl_in_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[idempotency]\nlock_ttl_secs = 0\n").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{err:?}");
}
