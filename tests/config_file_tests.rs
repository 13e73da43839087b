use iothub::ShutdownManager;
use iothub_core::AppConfig;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn shipped_config() -> String {
    format!("{}/config/iothub.toml", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn test_shipped_config_is_valid() {
    let config = AppConfig::load(Some(&shipped_config())).unwrap();

    assert_eq!(config.mqtt.topic_prefix, "iot/gateway");
    assert_eq!(config.rule_engine.property_stream, "iot_property_stream");
    assert_eq!(config.command.expire_after_seconds, 600);
    assert!(config.api.enabled);
}

#[test]
fn test_shipped_config_round_trips_through_toml() {
    let config = AppConfig::load(Some(&shipped_config())).unwrap();
    let rendered = config.to_toml().unwrap();
    let reparsed = AppConfig::from_toml(&rendered).unwrap();

    assert_eq!(reparsed.ingest.workers, config.ingest.workers);
    assert_eq!(reparsed.status_cache.ttl_seconds, config.status_cache.ttl_seconds);
}

#[test]
fn test_invalid_file_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[status_cache]
ttl_seconds = 600
offline_after_seconds = 300
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let err = AppConfig::load(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("状态缓存"));
}

#[test]
fn test_missing_file_is_rejected() {
    assert!(AppConfig::load(Some("/nonexistent/iothub.toml")).is_err());
}

#[tokio::test]
async fn test_shutdown_reaches_late_subscribers() {
    let manager = ShutdownManager::new();
    let mut early = manager.subscribe();
    manager.shutdown();
    let mut late = manager.subscribe();

    let both = async {
        early.recv().await.unwrap();
        late.recv().await.unwrap();
    };
    assert!(manager.wait_bounded(Duration::from_millis(200), both).await);
}
