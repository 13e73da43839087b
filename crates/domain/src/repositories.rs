//! 领域仓储抽象

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{AlertRecord, WriteCompletion, WriteLog};
use crate::IotResult;

/// 指令日志仓储
#[async_trait]
pub trait WriteLogRepository: Send + Sync {
    async fn insert(&self, log: &WriteLog) -> IotResult<()>;

    async fn find_by_seq(&self, seq: &str) -> IotResult<Option<WriteLog>>;

    /// 仅当记录仍为 WAITING 时写入终态，返回是否发生迁移
    async fn complete(&self, seq: &str, completion: &WriteCompletion) -> IotResult<bool>;

    /// 将创建时间早于 `cutoff` 的 WAITING 记录置为 FAIL，返回迁移条数
    async fn expire_waiting(&self, cutoff: DateTime<Utc>, reason: &str) -> IotResult<u64>;
}

/// 告警记录仓储
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// 保存告警，返回生成的ID
    async fn insert(&self, record: &AlertRecord) -> IotResult<i64>;
}
