use async_trait::async_trait;

use crate::entities::AlertRecord;
use crate::rule_dsl::NotifySink;
use crate::IotResult;

/// 告警通知渠道
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 对应 `NotifySink::kind`
    fn kind(&self) -> &str;

    async fn notify(&self, sink: &NotifySink, alert: &AlertRecord) -> IotResult<()>;
}
