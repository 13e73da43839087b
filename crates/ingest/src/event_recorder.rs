use async_trait::async_trait;
use iothub_core::models::EventReport;
use iothub_core::{IotResult, JobHandler};
use iothub_domain::{AlertRecord, AlertRepository};
use std::sync::Arc;
use tracing::{info, instrument};

/// 事件队列的处理器，把设备事件保存为告警记录
pub struct EventRecorder {
    alerts: Arc<dyn AlertRepository>,
}

impl EventRecorder {
    pub fn new(alerts: Arc<dyn AlertRepository>) -> Self {
        Self { alerts }
    }
}

#[async_trait]
impl JobHandler<EventReport> for EventRecorder {
    #[instrument(skip(self, report), fields(device = %report.dn, event = %report.event_code))]
    async fn handle(&self, report: EventReport) -> IotResult<()> {
        let record = AlertRecord::device_event(
            report.dn,
            report.event_code,
            report.level,
            report.data,
        );
        let id = self.alerts.insert(&record).await?;
        info!(alert_id = id, level = %record.level, "设备事件已记录");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iothub_core::IotError;
    use iothub_domain::AlertSource;
    use iothub_testing_utils::MockAlertRepository;
    use serde_json::json;

    fn report(level: Option<&str>) -> EventReport {
        EventReport {
            dn: "pump-3".to_string(),
            time: Some(1_700_000_000),
            event_code: "overheat".to_string(),
            level: level.map(str::to_string),
            data: json!({"temp": 96}),
        }
    }

    #[tokio::test]
    async fn test_event_saved_as_alert() {
        let alerts = MockAlertRepository::new();
        let recorder = EventRecorder::new(Arc::new(alerts.clone()));

        recorder.handle(report(None)).await.unwrap();

        let records = alerts.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, AlertSource::DeviceEvent);
        assert_eq!(records[0].device_id.as_deref(), Some("pump-3"));
        assert_eq!(records[0].code, "overheat");
        assert_eq!(records[0].level, "info");
        assert_eq!(records[0].payload, json!({"temp": 96}));
    }

    #[tokio::test]
    async fn test_storage_failure_is_returned() {
        let alerts = MockAlertRepository::new();
        alerts.set_fail(true);
        let recorder = EventRecorder::new(Arc::new(alerts.clone()));

        let err = recorder.handle(report(Some("critical"))).await.unwrap_err();
        assert!(matches!(err, IotError::DatabaseOperation(_)));
        assert_eq!(alerts.count(), 0);
    }
}
