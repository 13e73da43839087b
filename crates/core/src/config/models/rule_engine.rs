use serde::{Deserialize, Serialize};

/// 远端流式规则引擎（eKuiper REST）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEngineConfig {
    pub url: String,
    /// 规则命中后回调本服务的地址前缀
    pub callback_base_url: String,
    pub request_timeout_seconds: u64,
    /// 停止规则属于尽力而为的后台操作，超时更短
    pub stop_timeout_seconds: u64,
    pub property_stream: String,
    pub event_stream: String,
    pub status_stream: String,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9081".to_string(),
            callback_base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_seconds: 30,
            stop_timeout_seconds: 3,
            property_stream: "iot_property_stream".to_string(),
            event_stream: "iot_event_stream".to_string(),
            status_stream: "iot_status_stream".to_string(),
        }
    }
}

impl RuleEngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [("url", &self.url), ("callback_base_url", &self.callback_base_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow::anyhow!("规则引擎{}必须是HTTP格式: {}", name, url));
            }
        }

        if !(1..=30).contains(&self.request_timeout_seconds) {
            return Err(anyhow::anyhow!("规则引擎请求超时必须在1到30秒之间"));
        }

        if self.stop_timeout_seconds == 0 || self.stop_timeout_seconds > self.request_timeout_seconds
        {
            return Err(anyhow::anyhow!("停止规则超时必须大于0且不超过请求超时"));
        }

        for stream in [&self.property_stream, &self.event_stream, &self.status_stream] {
            if stream.is_empty() {
                return Err(anyhow::anyhow!("规则引擎数据流名称不能为空"));
            }
        }

        Ok(())
    }

    pub fn callback_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
