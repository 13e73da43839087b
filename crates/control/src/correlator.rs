//! 指令下发与应答关联
//!
//! 下发时先落库一条 WAITING 记录，再向网关发布带序列号的指令；网关应答经
//! 接入工作池回到 [`CommandCorrelator::write_back`]，按序列号把记录迁移到终态。
//! 同步调用方通过以序列号为键的一次性通道等待结果，超时后记录仍保持 WAITING，
//! 晚到的应答照常落库但不再通知原调用方。

use async_trait::async_trait;
use chrono::Utc;
use iothub_core::config::CommandConfig;
use iothub_core::models::{AckEnvelope, CommandEnvelope, Topics};
use iothub_core::traits::{AckSink, DeviceCatalog, MessageBroker, Qos};
use iothub_core::{IotError, IotResult};
use iothub_domain::{WriteChannel, WriteCompletion, WriteLog, WriteLogRepository, WriteStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, instrument, warn};

use crate::sequence::SequenceGenerator;

/// 超时清理写入的失败原因
pub const EXPIRED_REASON: &str = "timeout";

pub struct CommandCorrelator {
    catalog: Arc<dyn DeviceCatalog>,
    repo: Arc<dyn WriteLogRepository>,
    broker: Arc<dyn MessageBroker>,
    topics: Topics,
    sequence: SequenceGenerator,
    waiters: Mutex<HashMap<String, oneshot::Sender<WriteLog>>>,
    wait_timeout: Duration,
    expire_after: Option<chrono::Duration>,
    sweep_interval: Duration,
}

impl CommandCorrelator {
    pub fn new(
        catalog: Arc<dyn DeviceCatalog>,
        repo: Arc<dyn WriteLogRepository>,
        broker: Arc<dyn MessageBroker>,
        topics: Topics,
        config: &CommandConfig,
    ) -> Self {
        Self {
            catalog,
            repo,
            broker,
            topics,
            sequence: SequenceGenerator::new(),
            waiters: Mutex::new(HashMap::new()),
            wait_timeout: Duration::from_millis(config.wait_timeout_ms),
            expire_after: (config.expire_after_seconds > 0)
                .then(|| chrono::Duration::seconds(config.expire_after_seconds as i64)),
            sweep_interval: Duration::from_secs(config.sweep_interval_seconds.max(1)),
        }
    }

    /// 下发指令并立即返回序列号，不等待应答
    #[instrument(skip(self, value))]
    pub async fn deal(
        &self,
        device_id: &str,
        property: &str,
        value: &str,
        channel: WriteChannel,
        requester: Option<i64>,
    ) -> IotResult<String> {
        self.issue(device_id, property, value, channel, requester, None)
            .await
    }

    /// 下发指令并在配置的时长内等待应答
    ///
    /// 超时返回 [`IotError::Timeout`]，记录保持 WAITING。
    #[instrument(skip(self, value))]
    pub async fn deal_and_wait(
        &self,
        device_id: &str,
        property: &str,
        value: &str,
        channel: WriteChannel,
        requester: Option<i64>,
    ) -> IotResult<WriteLog> {
        let (tx, rx) = oneshot::channel();
        let seq = self
            .issue(device_id, property, value, channel, requester, Some(tx))
            .await?;

        match tokio::time::timeout(self.wait_timeout, rx).await {
            Ok(Ok(log)) => Ok(log),
            Ok(Err(_)) => self
                .repo
                .find_by_seq(&seq)
                .await?
                .ok_or(IotError::WriteLogNotFound { seq }),
            Err(_) => {
                self.take_waiter(&seq);
                warn!(seq = %seq, device = device_id, "等待指令应答超时");
                Err(IotError::timeout(format!(
                    "指令 {seq} 在 {}ms 内未收到应答",
                    self.wait_timeout.as_millis()
                )))
            }
        }
    }

    async fn issue(
        &self,
        device_id: &str,
        property: &str,
        value: &str,
        channel: WriteChannel,
        requester: Option<i64>,
        waiter: Option<oneshot::Sender<WriteLog>>,
    ) -> IotResult<String> {
        let gateway_id = self
            .catalog
            .gateway_of(device_id)
            .await?
            .ok_or_else(|| IotError::UnknownGateway(device_id.to_string()))?;

        let seq = self.sequence.next();
        let log = WriteLog::waiting(
            seq.clone(),
            device_id,
            gateway_id.clone(),
            property,
            value,
            channel,
            requester,
        );
        self.repo.insert(&log).await?;

        // 先登记等待方再发布，避免应答先于登记到达
        if let Some(tx) = waiter {
            self.waiters
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(seq.clone(), tx);
        }

        let payload = CommandEnvelope {
            seq: seq.clone(),
            device_code: device_id.to_string(),
            tag_code: property.to_string(),
            val: value.to_string(),
        }
        .to_payload()?;

        let topic = self.topics.command(&gateway_id);
        if let Err(e) = self.broker.publish(&topic, payload, Qos::AtLeastOnce).await {
            self.take_waiter(&seq);
            error!(seq = %seq, topic = %topic, error = %e, "指令发布失败");
            let completion = WriteCompletion::fail(format!("发布失败: {e}"), None);
            if let Err(store_err) = self.repo.complete(&seq, &completion).await {
                warn!(seq = %seq, error = %store_err, "更新指令日志失败");
            }
            return Err(e);
        }

        metrics::counter!("command_issued_total", "channel" => channel.as_str()).increment(1);
        info!(seq = %seq, gateway = %gateway_id, device = device_id, property, "指令已下发");
        Ok(seq)
    }

    /// 处理网关应答，返回记录是否发生了迁移
    ///
    /// 未知序列号或已处于终态的记录不会被修改。
    pub async fn write_back(&self, gateway_id: &str, payload: &[u8]) -> IotResult<bool> {
        let ack: AckEnvelope = serde_json::from_slice(payload)?;
        let completion = if ack.status {
            WriteCompletion::success(ack.value_text())
        } else {
            WriteCompletion::fail("设备执行失败", ack.value_text())
        };

        if !self.repo.complete(&ack.seq, &completion).await? {
            debug!(seq = %ack.seq, gateway = gateway_id, "应答对应的指令不存在或已结束");
            return Ok(false);
        }

        metrics::counter!("command_completed_total", "status" => completion.status.as_str())
            .increment(1);
        info!(seq = %ack.seq, gateway = gateway_id, status = %completion.status.as_str(), "指令已应答");

        if let Some(tx) = self.take_waiter(&ack.seq) {
            match self.repo.find_by_seq(&ack.seq).await? {
                Some(log) => {
                    // 等待方已超时离开时发送失败，忽略即可
                    let _ = tx.send(log);
                }
                None => warn!(seq = %ack.seq, "已完成的指令日志无法读取"),
            }
        }
        Ok(true)
    }

    /// 将超过保留时长仍为 WAITING 的记录置为失败，返回迁移条数
    pub async fn expire_pending(&self) -> IotResult<u64> {
        let Some(expire_after) = self.expire_after else {
            return Ok(0);
        };
        let cutoff = Utc::now() - expire_after;
        let expired = self.repo.expire_waiting(cutoff, EXPIRED_REASON).await?;
        if expired > 0 {
            metrics::counter!("command_completed_total", "status" => WriteStatus::Fail.as_str())
                .increment(expired);
            info!(expired, "清理超时未应答的指令");
        }
        Ok(expired)
    }

    pub async fn run_expiry(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        if self.expire_after.is_none() {
            info!("未启用指令超时清理");
            return;
        }
        let mut ticker = tokio::time::interval(self.sweep_interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("指令超时清理收到关闭信号");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.expire_pending().await {
                        error!(error = %e, "指令超时清理失败");
                    }
                }
            }
        }
    }

    /// 正在同步等待应答的指令数
    pub fn waiting_callers(&self) -> usize {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn take_waiter(&self, seq: &str) -> Option<oneshot::Sender<WriteLog>> {
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(seq)
    }
}

#[async_trait]
impl AckSink for CommandCorrelator {
    async fn write_back(&self, gateway_id: &str, payload: &[u8]) -> IotResult<()> {
        CommandCorrelator::write_back(self, gateway_id, payload)
            .await
            .map(|_| ())
    }
}
