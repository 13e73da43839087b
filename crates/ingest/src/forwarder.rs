use async_trait::async_trait;
use iothub_core::traits::{MessageBroker, Qos};
use iothub_core::{IotResult, JobHandler};
use std::sync::Arc;
use tracing::debug;

/// 待转发给规则引擎的标准化报文
#[derive(Debug, Clone)]
pub struct ForwardJob {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// 转发队列的处理器，发布失败只记录日志，不影响写库路径
pub struct StreamForwarder {
    broker: Arc<dyn MessageBroker>,
}

impl StreamForwarder {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl JobHandler<ForwardJob> for StreamForwarder {
    async fn handle(&self, job: ForwardJob) -> IotResult<()> {
        self.broker
            .publish(&job.topic, job.payload, Qos::AtMostOnce)
            .await?;
        debug!(topic = %job.topic, "已转发到数据流");
        Ok(())
    }
}
