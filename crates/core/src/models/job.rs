use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 入站消息分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// 控制指令应答
    ControlAck,
    /// 告警/事件上报
    AlertEvent,
    /// 属性上报
    PropertyReport,
    /// 上下线状态
    StreamStatus,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ControlAck => "control_ack",
            JobKind::AlertEvent => "alert_event",
            JobKind::PropertyReport => "property_report",
            JobKind::StreamStatus => "stream_status",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 接入任务，由分发器在收到消息时创建，被某个工作协程消费一次后丢弃
#[derive(Debug, Clone)]
pub struct Job {
    pub topic: String,
    pub gateway_id: String,
    pub kind: JobKind,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        topic: impl Into<String>,
        gateway_id: impl Into<String>,
        kind: JobKind,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            gateway_id: gateway_id.into(),
            kind,
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}
