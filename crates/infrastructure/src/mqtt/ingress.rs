use iothub_core::traits::InboundSink;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 持有 MQTT 事件循环，把收到的每条消息同步交给接收方
pub struct MqttIngress {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<String>,
    reconnect_delay: Duration,
}

impl MqttIngress {
    pub fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        subscriptions: Vec<String>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            client,
            eventloop,
            subscriptions,
            reconnect_delay,
        }
    }

    /// 运行事件循环直到收到关闭信号
    ///
    /// 出错后等待固定间隔再继续轮询，rumqttc 会在下一次轮询时重连；
    /// 每次收到 ConnAck 都重新订阅。断线期间的消息不做补发。
    pub async fn run(mut self, sink: Arc<dyn InboundSink>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(topics = ?self.subscriptions, "MQTT 接入启动");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("MQTT 接入收到关闭信号");
                    if let Err(e) = self.client.disconnect().await {
                        debug!("MQTT 断开连接失败: {}", e);
                    }
                    break;
                }
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            metrics::counter!("mqtt_messages_received_total").increment(1);
                            if !sink.submit(&publish.topic, publish.payload) {
                                debug!(topic = %publish.topic, "消息未被接收");
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("已连接到 MQTT Broker");
                            let queued = self.subscribe_all();
                            debug!(queued, "订阅请求已提交");
                        }
                        Ok(Event::Incoming(Packet::SubAck(_))) => {
                            debug!("订阅已确认");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "MQTT 事件循环错误");
                            warn!(delay_secs = self.reconnect_delay.as_secs(), "等待后重连");
                            tokio::select! {
                                _ = shutdown_rx.recv() => break,
                                _ = tokio::time::sleep(self.reconnect_delay) => {}
                            }
                        }
                    }
                }
            }
        }

        info!("MQTT 接入已停止");
    }

    /// 提交全部订阅请求，返回成功入队的数量
    ///
    /// 在事件循环内执行，请求通道已满时不能等待，失败的主题在下次 ConnAck 时重试。
    fn subscribe_all(&self) -> usize {
        let mut queued = 0;
        for topic in &self.subscriptions {
            match self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                Ok(()) => {
                    queued += 1;
                    info!(topic = %topic, "已订阅主题");
                }
                Err(e) => error!(topic = %topic, error = %e, "订阅主题失败"),
            }
        }
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::super::connect;
    use super::*;
    use iothub_core::config::MqttConfig;
    use rumqttc::MqttOptions;

    #[tokio::test]
    async fn test_connect_prepares_all_subscriptions() {
        let config = MqttConfig {
            topic_prefix: "site/gw".into(),
            reconnect_delay_seconds: 2,
            ..Default::default()
        };
        let (_broker, ingress) = connect(&config, "edge-01");
        assert_eq!(ingress.subscriptions.len(), 4);
        assert!(ingress.subscriptions.iter().all(|t| t.starts_with("site/gw/+/")));
        assert_eq!(ingress.reconnect_delay.as_secs(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_all_does_not_wait_on_full_request_channel() {
        let (client, eventloop) = AsyncClient::new(MqttOptions::new("t", "127.0.0.1", 1883), 1);
        client.try_publish("x", QoS::AtMostOnce, false, Vec::<u8>::new()).unwrap();
        let ingress = MqttIngress::new(
            client,
            eventloop,
            vec!["a/+/property".to_string(), "a/+/event".to_string()],
            Duration::from_secs(1),
        );

        assert_eq!(ingress.subscribe_all(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_all_queues_every_topic() {
        let (client, eventloop) = AsyncClient::new(MqttOptions::new("t", "127.0.0.1", 1883), 10);
        let ingress = MqttIngress::new(
            client,
            eventloop,
            vec!["a/+/property".to_string(), "a/+/event".to_string()],
            Duration::from_secs(1),
        );
        assert_eq!(ingress.subscribe_all(), 2);
    }
}
