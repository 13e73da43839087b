use crate::config::models::AppConfig;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.mqtt.topic_prefix, "iot/gateway");
    assert_eq!(config.writer.batch_size, 500);
    assert_eq!(config.command.expire_after_seconds, 600);
    assert!(config.api.enabled);
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[database]
url = "postgresql://test:5432/iothub_test"
max_connections = 15

[mqtt]
host = "broker.local"
port = 8883
topic_prefix = "factory/gw"

[tsdb]
database = "plant_a"

[writer]
batch_size = 200
flush_interval_ms = 500

[status_cache]
ttl_seconds = 60
max_entries = 10
offline_after_seconds = 600

[api]
bind_address = "127.0.0.1:9090"

[observability]
log_level = "debug"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();

    assert_eq!(config.database.url, "postgresql://test:5432/iothub_test");
    assert_eq!(config.database.max_connections, 15);
    // 未出现的字段取默认值
    assert_eq!(config.database.min_connections, 1);
    assert_eq!(config.mqtt.host, "broker.local");
    assert_eq!(config.mqtt.port, 8883);
    assert_eq!(config.mqtt.stream_prefix, "iot/stream");
    assert_eq!(config.tsdb.database, "plant_a");
    assert_eq!(config.writer.batch_size, 200);
    assert_eq!(config.status_cache.max_entries, 10);
    assert_eq!(config.api.bind_address, "127.0.0.1:9090");
    assert_eq!(config.observability.log_level, "debug");
}

#[test]
fn test_config_to_toml() {
    let config = AppConfig::default();
    let toml_str = config.to_toml().unwrap();

    let parsed_config = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(config.database.url, parsed_config.database.url);
    assert_eq!(config.mqtt.topic_prefix, parsed_config.mqtt.topic_prefix);
    assert_eq!(
        config.rule_engine.callback_base_url,
        parsed_config.rule_engine.callback_base_url
    );
}

#[test]
fn test_callback_url_join() {
    let mut config = AppConfig::default();
    config.rule_engine.callback_base_url = "http://hub:8080/".to_string();
    assert_eq!(
        config
            .rule_engine
            .callback_url("/api/rule/callback/scene/3"),
        "http://hub:8080/api/rule/callback/scene/3"
    );
}

#[test]
fn test_resolve_client_id() {
    let mut config = AppConfig::default();
    assert_eq!(config.mqtt.resolve_client_id("node-1"), "iothub-node-1");
    config.mqtt.client_id = "fixed".to_string();
    assert_eq!(config.mqtt.resolve_client_id("node-1"), "fixed");
}
