//! 告警通知渠道实现

use async_trait::async_trait;
use iothub_core::{IotError, IotResult};
use iothub_domain::{AlertRecord, Notifier, NotifySink};
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument};

/// 以 JSON POST 推送告警
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> IotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IotError::Configuration(format!("创建通知HTTP客户端失败: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn kind(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, sink, alert), fields(target = %sink.target, code = %alert.code))]
    async fn notify(&self, sink: &NotifySink, alert: &AlertRecord) -> IotResult<()> {
        if sink.target.is_empty() {
            return Err(IotError::Configuration("webhook 通知缺少目标地址".to_string()));
        }
        let body = json!({
            "alertId": alert.id,
            "source": alert.source,
            "ruleId": alert.rule_id,
            "deviceId": alert.device_id,
            "code": alert.code,
            "level": alert.level,
            "payload": alert.payload,
            "time": alert.created_at.to_rfc3339(),
        });
        let response = self
            .client
            .post(&sink.target)
            .json(&body)
            .send()
            .await
            .map_err(|e| IotError::Network(format!("发送webhook通知失败: {e}")))?;
        if !response.status().is_success() {
            return Err(IotError::Network(format!(
                "webhook 通知返回 HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// 仅写日志的通知渠道
#[derive(Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    fn kind(&self) -> &str {
        "log"
    }

    async fn notify(&self, sink: &NotifySink, alert: &AlertRecord) -> IotResult<()> {
        info!(
            target: "iothub::alert",
            sink = %sink.target,
            code = %alert.code,
            level = %alert.level,
            device = ?alert.device_id,
            "告警通知"
        );
        Ok(())
    }
}
