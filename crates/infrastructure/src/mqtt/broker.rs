use async_trait::async_trait;
use iothub_core::traits::{MessageBroker, Qos};
use iothub_core::{IotError, IotResult};
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

/// 基于 rumqttc 的消息发布端
#[derive(Clone)]
pub struct MqttBroker {
    client: AsyncClient,
}

impl MqttBroker {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

fn to_mqtt_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

#[async_trait]
impl MessageBroker for MqttBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> IotResult<()> {
        let size = payload.len();
        self.client
            .publish(topic, to_mqtt_qos(qos), false, payload)
            .await
            .map_err(|e| IotError::Transport(format!("发布消息到 {topic} 失败: {e}")))?;
        debug!(topic, size, "消息已发布");
        Ok(())
    }
}
