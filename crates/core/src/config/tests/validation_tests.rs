use crate::config::models::*;

#[test]
fn test_database_url_validation() {
    let mut config = DatabaseConfig::default();
    config.url = "mysql://localhost/iothub".to_string();
    assert!(config.validate().is_err());

    config.url = "postgres://localhost/iothub".to_string();
    assert!(config.validate().is_ok());

    config.min_connections = 20;
    assert!(config.validate().is_err());
}

#[test]
fn test_topic_prefix_validation() {
    let mut config = MqttConfig::default();
    config.topic_prefix = "iot/gateway/".to_string();
    assert!(config.validate().is_err());

    config.topic_prefix = "iot/+/gw".to_string();
    assert!(config.validate().is_err());

    config.topic_prefix = config.stream_prefix.clone();
    assert!(config.validate().is_err());
}

#[test]
fn test_tsdb_database_name_validation() {
    let mut config = TsdbConfig::default();
    config.database = "iot; DROP DATABASE x".to_string();
    assert!(config.validate().is_err());

    config.database = "iot_2".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_rule_engine_timeout_bounds() {
    let mut config = RuleEngineConfig::default();
    config.request_timeout_seconds = 31;
    assert!(config.validate().is_err());

    config.request_timeout_seconds = 5;
    config.stop_timeout_seconds = 10;
    assert!(config.validate().is_err());
}

#[test]
fn test_status_cache_window_validation() {
    let mut config = StatusCacheConfig::default();
    config.offline_after_seconds = config.ttl_seconds;
    assert!(config.validate().is_err());
}

#[test]
fn test_command_expiry_validation() {
    let mut config = CommandConfig::default();
    config.expire_after_seconds = 0;
    config.sweep_interval_seconds = 0;
    // 关闭过期清理后不再检查巡检间隔
    assert!(config.validate().is_ok());

    config.expire_after_seconds = 2;
    config.sweep_interval_seconds = 1;
    assert!(config.validate().is_err());
}

#[test]
fn test_observability_validation() {
    let mut config = ObservabilityConfig::default();
    config.log_level = "verbose".to_string();
    assert!(config.validate().is_err());

    config.log_level = "warn".to_string();
    config.metrics_bind_address = "not-an-addr".to_string();
    assert!(config.validate().is_err());

    config.metrics_enabled = false;
    assert!(config.validate().is_ok());
}
