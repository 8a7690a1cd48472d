use std::io::Write;
use tabrec_common::config::schema::{MAX_READY_ATTEMPTS, RelayConfig};
use tabrec_common::config::{ConfigError, ConfigLoader, RecorderConfig};
use tempfile::NamedTempFile;

#[test]
fn test_defaults() {
    let config = RecorderConfig::default();
    assert_eq!(config.buffers.console_capacity, 1000);
    assert_eq!(config.buffers.network_capacity, 500);
    assert_eq!(config.relay.ready_attempts, 10);
    assert_eq!(config.relay.ready_interval_ms, 100);
    assert_eq!(config.relay.injection_delay_ms, 50);
    assert_eq!(config.server.port, 9001);
}

#[tokio::test]
async fn test_load_partial_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "buffers:\n  console_capacity: 10\nserver:\n  port: 9100\nstorage:\n  path: /tmp/snap.json"
    )
    .unwrap();

    let config = ConfigLoader::load(Some(file.path())).await.unwrap();
    assert_eq!(config.buffers.console_capacity, 10);
    assert_eq!(config.buffers.network_capacity, 500);
    assert_eq!(config.server.port, 9100);
    assert_eq!(
        config.storage.resolved_path(),
        std::path::PathBuf::from("/tmp/snap.json")
    );
    assert_eq!(config.relay.ready_attempts, 10);
}

#[tokio::test]
async fn test_load_errors() {
    let missing = ConfigLoader::load_from(std::path::Path::new("/nonexistent/tabrec.yaml")).await;
    assert!(matches!(missing, Err(ConfigError::Io(_))));

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "buffers: [not, a, map]").unwrap();
    let invalid = ConfigLoader::load_from(file.path()).await;
    assert!(matches!(invalid, Err(ConfigError::Parse(_))));
}

#[tokio::test]
async fn test_explicit_path_is_not_a_fallback() {
    let missing = ConfigLoader::load(Some(std::path::Path::new("/nonexistent/tabrec.yaml"))).await;
    assert!(matches!(missing, Err(ConfigError::Io(_))));

    let locations = ConfigLoader::default_locations();
    assert_eq!(locations[0], std::path::PathBuf::from("./tabrec.yaml"));
    if let Some(home) = locations.get(1) {
        assert!(home.ends_with(".tabrec/config.yaml"));
    }
}

#[test]
fn test_ready_attempts_are_bounded() {
    let relay = RelayConfig {
        ready_attempts: 50,
        ..RelayConfig::default()
    };
    assert_eq!(relay.bounded_attempts(), MAX_READY_ATTEMPTS);

    let relay = RelayConfig {
        ready_attempts: 0,
        ..RelayConfig::default()
    };
    assert_eq!(relay.bounded_attempts(), 1);
    assert_eq!(RelayConfig::default().bounded_attempts(), 10);
}
