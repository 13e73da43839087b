use async_trait::async_trait;
use iothub_core::models::{
    EventReport, Job, JobKind, PropertyReport, StatusReport, StreamEnvelope, Topics,
};
use iothub_core::traits::AckSink;
use iothub_core::{IotResult, JobHandler, JobPool};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::forwarder::ForwardJob;
use crate::status_tracker::DeviceStatusTracker;
use crate::writer::TelemetryWriter;

/// 接入队列的处理器，按消息类别分派
///
/// 属性上报同时走两条互不影响的路径：写入时序缓冲区，以及投递到转发队列
/// 供规则引擎消费。转发队列满或发布失败不影响写库。
pub struct IngestHandler {
    topics: Topics,
    writer: Arc<TelemetryWriter>,
    tracker: Arc<DeviceStatusTracker>,
    forward: Arc<JobPool<ForwardJob>>,
    events: Arc<JobPool<EventReport>>,
    acks: Arc<dyn AckSink>,
}

impl IngestHandler {
    pub fn new(
        topics: Topics,
        writer: Arc<TelemetryWriter>,
        tracker: Arc<DeviceStatusTracker>,
        forward: Arc<JobPool<ForwardJob>>,
        events: Arc<JobPool<EventReport>>,
        acks: Arc<dyn AckSink>,
    ) -> Self {
        Self {
            topics,
            writer,
            tracker,
            forward,
            events,
            acks,
        }
    }

    async fn handle_property(&self, job: &Job) -> IotResult<()> {
        let report: PropertyReport = serde_json::from_slice(&job.payload)?;
        let point = report.into_point(job.received_at.timestamp());
        let device_id = point.device_id.clone();

        self.forward_envelope(self.topics.stream_property(), &StreamEnvelope::property(&point));
        self.writer.add(point);

        if let Err(e) = self.tracker.on_property_report(&device_id, job.received_at).await {
            warn!(device = %device_id, error = %e, "更新设备在线状态失败");
        }
        Ok(())
    }

    async fn handle_status(&self, job: &Job) -> IotResult<()> {
        let report: StatusReport = serde_json::from_slice(&job.payload)?;
        let time = report.time.unwrap_or_else(|| job.received_at.timestamp());

        self.forward_envelope(self.topics.stream_status(), &StreamEnvelope::status(&report, time));
        self.tracker
            .on_status_change(&report.dn, report.is_online(), job.received_at)
            .await
    }

    fn handle_event(&self, job: &Job) -> IotResult<()> {
        let report: EventReport = serde_json::from_slice(&job.payload)?;
        let time = report.time.unwrap_or_else(|| job.received_at.timestamp());

        self.forward_envelope(self.topics.stream_event(), &StreamEnvelope::event(&report, time));
        self.events.try_submit(report);
        Ok(())
    }

    fn forward_envelope(&self, topic: String, envelope: &StreamEnvelope) {
        match serde_json::to_vec(envelope) {
            Ok(payload) => {
                self.forward.try_submit(ForwardJob { topic, payload });
            }
            Err(e) => debug!(error = %e, "序列化数据流报文失败"),
        }
    }
}

#[async_trait]
impl JobHandler<Job> for IngestHandler {
    async fn handle(&self, job: Job) -> IotResult<()> {
        let result = match job.kind {
            JobKind::PropertyReport => self.handle_property(&job).await,
            JobKind::StreamStatus => self.handle_status(&job).await,
            JobKind::AlertEvent => self.handle_event(&job),
            JobKind::ControlAck => self.acks.write_back(&job.gateway_id, &job.payload).await,
        };
        metrics::counter!("ingest_jobs_processed_total", "kind" => job.kind.as_str()).increment(1);
        if let Err(e) = &result {
            debug!(topic = %job.topic, kind = %job.kind, error = %e, "消息处理失败");
        }
        result
    }
}
