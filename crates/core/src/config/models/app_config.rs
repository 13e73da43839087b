use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    pipeline::{CommandConfig, IngestConfig, StatusCacheConfig, WriterConfig},
    rule_engine::RuleEngineConfig,
    storage::TsdbConfig,
    transport::MqttConfig,
};

/// 默认配置文件查找路径，按顺序取第一个存在的文件
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/iothub.toml",
    "iothub.toml",
    "/etc/iothub/config.toml",
];

/// 平台配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub mqtt: MqttConfig,
    pub tsdb: TsdbConfig,
    pub rule_engine: RuleEngineConfig,
    pub ingest: IngestConfig,
    pub writer: WriterConfig,
    pub status_cache: StatusCacheConfig,
    pub command: CommandConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序:
    /// 1. 默认值
    /// 2. 配置文件 (TOML)
    /// 3. 环境变量覆盖 (前缀 `IOTHUB`，层级分隔符 `__`，如 `IOTHUB__MQTT__HOST`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("IOTHUB")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.mqtt.validate().context("MQTT配置验证失败")?;
        self.tsdb.validate().context("时序库配置验证失败")?;
        self.rule_engine
            .validate()
            .context("规则引擎配置验证失败")?;
        self.ingest.validate().context("接入配置验证失败")?;
        self.writer.validate().context("批量写入配置验证失败")?;
        self.status_cache
            .validate()
            .context("状态缓存配置验证失败")?;
        self.command.validate().context("指令配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
