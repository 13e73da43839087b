//! 主题布局
//!
//! 网关侧：`{prefix}/{gateway}/property|event|status|write/ack` 上行，`{prefix}/{gateway}/write` 下行。
//! 规则引擎侧：`{stream_prefix}/property|event|status`。

use crate::config::MqttConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
    stream_prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>, stream_prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stream_prefix: stream_prefix.into(),
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        Self::new(config.topic_prefix.clone(), config.stream_prefix.clone())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 需要订阅的四类上行主题
    pub fn subscriptions(&self) -> [String; 4] {
        [
            format!("{}/+/write/ack", self.prefix),
            format!("{}/+/event", self.prefix),
            format!("{}/+/property", self.prefix),
            format!("{}/+/status", self.prefix),
        ]
    }

    pub fn command(&self, gateway_id: &str) -> String {
        format!("{}/{}/write", self.prefix, gateway_id)
    }

    pub fn stream_property(&self) -> String {
        format!("{}/property", self.stream_prefix)
    }

    pub fn stream_event(&self) -> String {
        format!("{}/event", self.stream_prefix)
    }

    pub fn stream_status(&self) -> String {
        format!("{}/status", self.stream_prefix)
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::from_config(&MqttConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_layout() {
        let topics = Topics::new("iot/gateway", "iot/stream");
        assert_eq!(topics.command("gw1"), "iot/gateway/gw1/write");
        assert_eq!(topics.stream_status(), "iot/stream/status");
        assert!(topics
            .subscriptions()
            .contains(&"iot/gateway/+/write/ack".to_string()));
    }
}
