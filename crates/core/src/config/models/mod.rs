pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod pipeline;
pub mod rule_engine;
pub mod storage;
pub mod transport;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::{AppConfig, DEFAULT_CONFIG_PATHS};
pub use database::DatabaseConfig;
pub use pipeline::{CommandConfig, IngestConfig, StatusCacheConfig, WriterConfig};
pub use rule_engine::RuleEngineConfig;
pub use storage::TsdbConfig;
pub use transport::MqttConfig;
