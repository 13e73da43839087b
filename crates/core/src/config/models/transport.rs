use serde::{Deserialize, Serialize};

/// MQTT 接入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// 为空时使用 `iothub-{hostname}`
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_seconds: u64,
    /// 网关上行/下行主题前缀，例如 `iot/gateway/{gw}/property`
    pub topic_prefix: String,
    /// 规则引擎消费的标准化数据流主题前缀
    pub stream_prefix: String,
    pub reconnect_delay_seconds: u64,
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: String::new(),
            username: None,
            password: None,
            keep_alive_seconds: 30,
            topic_prefix: "iot/gateway".to_string(),
            stream_prefix: "iot/stream".to_string(),
            reconnect_delay_seconds: 5,
            channel_capacity: 1000,
        }
    }
}

impl MqttConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("MQTT主机地址不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("MQTT端口必须大于0"));
        }

        if self.keep_alive_seconds == 0 {
            return Err(anyhow::anyhow!("MQTT心跳间隔必须大于0"));
        }

        for (name, prefix) in [
            ("topic_prefix", &self.topic_prefix),
            ("stream_prefix", &self.stream_prefix),
        ] {
            if prefix.is_empty() || prefix.ends_with('/') || prefix.contains(['+', '#']) {
                return Err(anyhow::anyhow!("无效的主题前缀 {}: {}", name, prefix));
            }
        }

        if self.topic_prefix == self.stream_prefix {
            return Err(anyhow::anyhow!("网关主题前缀与数据流主题前缀不能相同"));
        }

        if self.channel_capacity == 0 {
            return Err(anyhow::anyhow!("MQTT通道容量必须大于0"));
        }

        Ok(())
    }

    /// 解析最终使用的客户端ID
    pub fn resolve_client_id(&self, hostname: &str) -> String {
        if self.client_id.is_empty() {
            format!("iothub-{hostname}")
        } else {
            self.client_id.clone()
        }
    }
}
