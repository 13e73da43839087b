use serde::{Deserialize, Serialize};

/// 时序库（TDengine REST）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TsdbConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub request_timeout_seconds: u64,
    /// 未声明长度的文本属性列宽
    pub default_text_length: u32,
}

impl Default for TsdbConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6041".to_string(),
            username: "root".to_string(),
            password: "taosdata".to_string(),
            database: "iot".to_string(),
            request_timeout_seconds: 10,
            default_text_length: 64,
        }
    }
}

impl TsdbConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(anyhow::anyhow!("时序库URL必须是HTTP格式: {}", self.url));
        }

        if self.database.is_empty()
            || !self
                .database
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(anyhow::anyhow!("无效的时序库名称: {}", self.database));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("时序库请求超时时间必须大于0"));
        }

        if self.default_text_length == 0 || self.default_text_length > 16374 {
            return Err(anyhow::anyhow!(
                "文本列默认长度必须在1到16374之间: {}",
                self.default_text_length
            ));
        }

        Ok(())
    }
}
