use async_trait::async_trait;
use bytes::Bytes;

use crate::IotResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
}

/// 消息发布抽象
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// 发布一条消息，只在发布调用期间阻塞调用方
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> IotResult<()>;
}

/// 入站消息的接收方，由传输层在事件循环中同步调用，不得阻塞
pub trait InboundSink: Send + Sync {
    /// 返回消息是否被接收
    fn submit(&self, topic: &str, payload: Bytes) -> bool;
}

/// 控制指令应答的接收方，由接入工作协程调用
#[async_trait]
pub trait AckSink: Send + Sync {
    async fn write_back(&self, gateway_id: &str, payload: &[u8]) -> IotResult<()>;
}
