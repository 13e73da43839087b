//! MQTT 传输层（rumqttc）

mod broker;
mod ingress;

pub use broker::MqttBroker;
pub use ingress::MqttIngress;

use iothub_core::config::MqttConfig;
use iothub_core::models::Topics;
use rumqttc::{AsyncClient, MqttOptions};
use std::time::Duration;

/// 建立客户端，返回发布端与事件循环
///
/// 连接在 [`MqttIngress::run`] 首次轮询时才真正建立。
pub fn connect(config: &MqttConfig, hostname: &str) -> (MqttBroker, MqttIngress) {
    let client_id = config.resolve_client_id(hostname);
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));
    options.set_clean_session(true);
    if let Some(username) = &config.username {
        options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
    }

    let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);
    let topics = Topics::from_config(config);

    (
        MqttBroker::new(client.clone()),
        MqttIngress::new(
            client,
            eventloop,
            topics.subscriptions().to_vec(),
            Duration::from_secs(config.reconnect_delay_seconds),
        ),
    )
}
