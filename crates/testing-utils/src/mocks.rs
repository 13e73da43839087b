//! 协作方 trait 的内存实现
//!
//! 所有替身都可以 `Clone`，克隆体共享同一份内部状态，便于在被测组件
//! 持有一份的同时由测试断言另一份。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iothub_core::models::{ColumnDef, PropertySpec, RuleDefinition, RuleStatus, SubTableBatch};
use iothub_core::traits::{
    AckSink, DeviceCatalog, MessageBroker, Qos, RuleEngineClient, TimeSeriesStore,
};
use iothub_core::{IotError, IotResult};
use iothub_domain::{
    AlertRecord, AlertRepository, Notifier, NotifySink, WriteCompletion, WriteLog,
    WriteLogRepository, WriteStatus,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// 消息发布
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
}

impl PublishedMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// 记录所有发布消息的内存 Broker
#[derive(Debug, Clone, Default)]
pub struct MockMessageBroker {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    fail: Arc<AtomicBool>,
}

impl MockMessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的发布都返回传输错误
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

#[async_trait]
impl MessageBroker for MockMessageBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> IotResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IotError::Transport("broker unavailable".to_string()));
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 时序库
// ---------------------------------------------------------------------------

/// 内存时序库，记录建表、加列与写入
#[derive(Debug, Clone, Default)]
pub struct MockTimeSeriesStore {
    stables: Arc<Mutex<HashMap<String, Vec<ColumnDef>>>>,
    batches: Arc<Mutex<Vec<SubTableBatch>>>,
    ddl: Arc<Mutex<Vec<String>>>,
    insert_calls: Arc<AtomicUsize>,
    fail_insert: Arc<AtomicBool>,
}

impl MockTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stable(self, stable: &str, columns: Vec<ColumnDef>) -> Self {
        self.stables
            .lock()
            .unwrap()
            .insert(stable.to_string(), columns);
        self
    }

    pub fn set_fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn columns_of(&self, stable: &str) -> Option<Vec<String>> {
        self.stables
            .lock()
            .unwrap()
            .get(stable)
            .map(|cols| cols.iter().map(|c| c.name.clone()).collect())
    }

    /// 形如 `CREATE meter`、`ALTER meter humidity` 的结构变更记录
    pub fn ddl_statements(&self) -> Vec<String> {
        self.ddl.lock().unwrap().clone()
    }

    pub fn inserted_batches(&self) -> Vec<SubTableBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn inserted_rows(&self) -> usize {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.rows.len())
            .sum()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeSeriesStore for MockTimeSeriesStore {
    async fn describe(&self, stable: &str) -> IotResult<Option<Vec<String>>> {
        Ok(self.columns_of(stable))
    }

    async fn create_stable(&self, stable: &str, columns: &[ColumnDef]) -> IotResult<()> {
        let mut stables = self.stables.lock().unwrap();
        if !stables.contains_key(stable) {
            stables.insert(stable.to_string(), columns.to_vec());
            self.ddl.lock().unwrap().push(format!("CREATE {stable}"));
        }
        Ok(())
    }

    async fn add_column(&self, stable: &str, column: &ColumnDef) -> IotResult<()> {
        let mut stables = self.stables.lock().unwrap();
        let columns = stables
            .get_mut(stable)
            .ok_or_else(|| IotError::TimeSeries(format!("Table {stable} does not exist")))?;
        if !columns.iter().any(|c| c.name == column.name) {
            columns.push(column.clone());
            self.ddl
                .lock()
                .unwrap()
                .push(format!("ALTER {stable} {}", column.name));
        }
        Ok(())
    }

    async fn insert(&self, batches: &[SubTableBatch]) -> IotResult<usize> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(IotError::TimeSeries("insert rejected".to_string()));
        }
        let rows = batches.iter().map(|b| b.rows.len()).sum();
        self.batches.lock().unwrap().extend_from_slice(batches);
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// 设备目录
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockDevice {
    pub stable: String,
    pub gateway: Option<String>,
    pub online: bool,
    pub last_online: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct MockDeviceCatalog {
    devices: Arc<Mutex<HashMap<String, MockDevice>>>,
    specs: Arc<Mutex<HashMap<String, Vec<PropertySpec>>>>,
    online_writes: Arc<AtomicUsize>,
    offline_writes: Arc<AtomicUsize>,
    last_online_writes: Arc<AtomicUsize>,
}

impl MockDeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device_id: &str, stable: &str, gateway: Option<&str>) -> Self {
        self.add_device(device_id, stable, gateway);
        self
    }

    pub fn with_specs(self, stable: &str, specs: Vec<PropertySpec>) -> Self {
        self.specs.lock().unwrap().insert(stable.to_string(), specs);
        self
    }

    /// 运行期新增设备，模拟目录在启动后变化
    pub fn add_device(&self, device_id: &str, stable: &str, gateway: Option<&str>) {
        self.devices.lock().unwrap().insert(
            device_id.to_string(),
            MockDevice {
                stable: stable.to_string(),
                gateway: gateway.map(str::to_string),
                online: false,
                last_online: None,
            },
        );
    }

    /// 直接设置设备状态，不计入写入次数
    pub fn preset(&self, device_id: &str, online: bool, last_online: Option<DateTime<Utc>>) {
        if let Some(device) = self.devices.lock().unwrap().get_mut(device_id) {
            device.online = online;
            device.last_online = last_online;
        }
    }

    pub fn device(&self, device_id: &str) -> Option<MockDevice> {
        self.devices.lock().unwrap().get(device_id).cloned()
    }

    /// `set_online(true)` 的调用次数
    pub fn online_writes(&self) -> usize {
        self.online_writes.load(Ordering::SeqCst)
    }

    pub fn offline_writes(&self) -> usize {
        self.offline_writes.load(Ordering::SeqCst)
    }

    pub fn last_online_writes(&self) -> usize {
        self.last_online_writes.load(Ordering::SeqCst)
    }

    fn with_known<T>(&self, device_id: &str, f: impl FnOnce(&mut MockDevice) -> T) -> IotResult<T> {
        let mut devices = self.devices.lock().unwrap();
        devices
            .get_mut(device_id)
            .map(f)
            .ok_or_else(|| IotError::UnknownDevice(device_id.to_string()))
    }
}

#[async_trait]
impl DeviceCatalog for MockDeviceCatalog {
    async fn load_table_mapping(&self) -> IotResult<HashMap<String, String>> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .map(|(id, d)| (id.clone(), d.stable.clone()))
            .collect())
    }

    async fn table_of(&self, device_id: &str) -> IotResult<Option<String>> {
        Ok(self.device(device_id).map(|d| d.stable))
    }

    async fn property_specs(&self, stable: &str) -> IotResult<Vec<PropertySpec>> {
        Ok(self
            .specs
            .lock()
            .unwrap()
            .get(stable)
            .cloned()
            .unwrap_or_default())
    }

    async fn gateway_of(&self, device_id: &str) -> IotResult<Option<String>> {
        Ok(self.device(device_id).and_then(|d| d.gateway))
    }

    async fn is_online(&self, device_id: &str) -> IotResult<bool> {
        self.with_known(device_id, |d| d.online)
    }

    async fn set_online(&self, device_id: &str, online: bool) -> IotResult<()> {
        self.with_known(device_id, |d| d.online = online)?;
        if online {
            self.online_writes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.offline_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn last_online(&self, device_id: &str) -> IotResult<Option<DateTime<Utc>>> {
        self.with_known(device_id, |d| d.last_online)
    }

    async fn set_last_online(&self, device_id: &str, at: DateTime<Utc>) -> IotResult<()> {
        self.with_known(device_id, |d| d.last_online = Some(at))?;
        self.last_online_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn online_devices(&self) -> IotResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, d)| d.online)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// 仓储
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MockWriteLogRepository {
    logs: Arc<Mutex<HashMap<String, WriteLog>>>,
}

impl MockWriteLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, seq: &str) -> Option<WriteLog> {
        self.logs.lock().unwrap().get(seq).cloned()
    }

    pub fn all(&self) -> Vec<WriteLog> {
        self.logs.lock().unwrap().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.logs.lock().unwrap().len()
    }

    pub fn count_with_status(&self, status: WriteStatus) -> usize {
        self.logs
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.status == status)
            .count()
    }

    /// 修改记录创建时间，用于过期清理测试
    pub fn backdate(&self, seq: &str, created_at: DateTime<Utc>) {
        if let Some(log) = self.logs.lock().unwrap().get_mut(seq) {
            log.created_at = created_at;
        }
    }
}

#[async_trait]
impl WriteLogRepository for MockWriteLogRepository {
    async fn insert(&self, log: &WriteLog) -> IotResult<()> {
        let mut logs = self.logs.lock().unwrap();
        if logs.contains_key(&log.seq) {
            return Err(IotError::DatabaseOperation(format!(
                "duplicate key seq {}",
                log.seq
            )));
        }
        logs.insert(log.seq.clone(), log.clone());
        Ok(())
    }

    async fn find_by_seq(&self, seq: &str) -> IotResult<Option<WriteLog>> {
        Ok(self.get(seq))
    }

    async fn complete(&self, seq: &str, completion: &WriteCompletion) -> IotResult<bool> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get_mut(seq)
            .map(|log| log.apply(completion))
            .unwrap_or(false))
    }

    async fn expire_waiting(&self, cutoff: DateTime<Utc>, reason: &str) -> IotResult<u64> {
        let completion = WriteCompletion::fail(reason, None);
        let mut expired = 0;
        for log in self.logs.lock().unwrap().values_mut() {
            if log.status == WriteStatus::Waiting && log.created_at < cutoff && log.apply(&completion) {
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockAlertRepository {
    records: Arc<Mutex<Vec<AlertRecord>>>,
    fail: Arc<AtomicBool>,
}

impl MockAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的写入都返回数据库错误
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AlertRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertRepository for MockAlertRepository {
    async fn insert(&self, record: &AlertRecord) -> IotResult<i64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IotError::DatabaseOperation("alert insert failed".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        let id = records.len() as i64 + 1;
        let mut stored = record.clone();
        stored.id = id;
        records.push(stored);
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// 规则引擎
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockRule {
    pub definition: RuleDefinition,
    pub running: bool,
}

/// 内存规则引擎，按调用顺序记录 `操作:规则ID`
#[derive(Debug, Clone, Default)]
pub struct MockRuleEngineClient {
    rules: Arc<Mutex<HashMap<String, MockRule>>>,
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
}

impl MockRuleEngineClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 令指定操作（`create`、`update`、`start` 等）返回 HTTP 400 及给定信息
    pub fn fail_on(&self, operation: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(operation.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn rule(&self, rule_id: &str) -> Option<MockRule> {
        self.rules.lock().unwrap().get(rule_id).cloned()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &str, rule_id: &str) -> IotResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{operation}:{rule_id}"));
        match self.failures.lock().unwrap().get(operation) {
            Some(message) => Err(IotError::RuleEngine {
                status: 400,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn with_rule<T>(&self, rule_id: &str, f: impl FnOnce(&mut MockRule) -> T) -> IotResult<T> {
        self.rules
            .lock()
            .unwrap()
            .get_mut(rule_id)
            .map(f)
            .ok_or_else(|| IotError::RemoteNotFound(format!("rule {rule_id} not found")))
    }
}

#[async_trait]
impl RuleEngineClient for MockRuleEngineClient {
    async fn rule_exists(&self, rule_id: &str) -> IotResult<bool> {
        self.record("exists", rule_id)?;
        Ok(self.rules.lock().unwrap().contains_key(rule_id))
    }

    async fn create_rule(&self, rule: &RuleDefinition) -> IotResult<()> {
        self.record("create", &rule.id)?;
        let mut rules = self.rules.lock().unwrap();
        if rules.contains_key(&rule.id) {
            return Err(IotError::RuleEngine {
                status: 400,
                message: format!("rule {} already exists", rule.id),
            });
        }
        // eKuiper 创建规则后立即运行
        rules.insert(
            rule.id.clone(),
            MockRule {
                definition: rule.clone(),
                running: true,
            },
        );
        Ok(())
    }

    async fn update_rule(&self, rule: &RuleDefinition) -> IotResult<()> {
        self.record("update", &rule.id)?;
        self.with_rule(&rule.id, |r| r.definition = rule.clone())
    }

    async fn delete_rule(&self, rule_id: &str) -> IotResult<()> {
        self.record("delete", rule_id)?;
        self.rules
            .lock()
            .unwrap()
            .remove(rule_id)
            .map(|_| ())
            .ok_or_else(|| IotError::RemoteNotFound(format!("rule {rule_id} not found")))
    }

    async fn start_rule(&self, rule_id: &str) -> IotResult<()> {
        self.record("start", rule_id)?;
        self.with_rule(rule_id, |r| r.running = true)
    }

    async fn stop_rule(&self, rule_id: &str) -> IotResult<()> {
        self.record("stop", rule_id)?;
        self.with_rule(rule_id, |r| r.running = false)
    }

    async fn restart_rule(&self, rule_id: &str) -> IotResult<()> {
        self.record("restart", rule_id)?;
        self.with_rule(rule_id, |r| r.running = true)
    }

    async fn rule_status(&self, rule_id: &str) -> IotResult<RuleStatus> {
        self.record("status", rule_id)?;
        let running = self.with_rule(rule_id, |r| r.running)?;
        let status = if running {
            "running"
        } else {
            "stopped: canceled manually."
        };
        Ok(RuleStatus {
            status: status.to_string(),
            detail: json!({ "status": status }),
        })
    }
}

// ---------------------------------------------------------------------------
// 通知与应答
// ---------------------------------------------------------------------------

/// 记录每次通知的渠道
#[derive(Debug, Clone)]
pub struct RecordingNotifier {
    kind: String,
    sent: Arc<Mutex<Vec<(NotifySink, AlertRecord)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            sent: Arc::default(),
            fail: Arc::default(),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(NotifySink, AlertRecord)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn notify(&self, sink: &NotifySink, alert: &AlertRecord) -> IotResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IotError::Network("notify failed".to_string()));
        }
        self.sent.lock().unwrap().push((sink.clone(), alert.clone()));
        Ok(())
    }
}

/// 记录收到的控制应答
#[derive(Debug, Clone, Default)]
pub struct RecordingAckSink {
    acks: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl RecordingAckSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acks(&self) -> Vec<(String, Vec<u8>)> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl AckSink for RecordingAckSink {
    async fn write_back(&self, gateway_id: &str, payload: &[u8]) -> IotResult<()> {
        self.acks
            .lock()
            .unwrap()
            .push((gateway_id.to_string(), payload.to_vec()));
        Ok(())
    }
}
