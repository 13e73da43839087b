//! 时序数据批量写入
//!
//! 生产者只在追加时持有缓冲区锁；刷新时在锁内整体换出缓冲区，分组、
//! 结构变更与网络写入都在锁外完成。达到批量上限或定时器到期都会触发刷新。

use iothub_core::config::WriterConfig;
use iothub_core::models::{
    device_table_name, sanitize_identifier, SubTableBatch, TableRow, TelemetryPoint,
};
use iothub_core::traits::TimeSeriesStore;
use iothub_core::IotResult;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info, warn};

use crate::schema_registry::SchemaRegistry;

pub struct TelemetryWriter {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn TimeSeriesStore>,
    batch_size: usize,
    flush_interval: Duration,
    buffer: Mutex<Vec<TelemetryPoint>>,
    flush_signal: Notify,
    skipped: AtomicU64,
}

impl TelemetryWriter {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn TimeSeriesStore>,
        config: &WriterConfig,
    ) -> Self {
        Self {
            registry,
            store,
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            buffer: Mutex::new(Vec::with_capacity(config.batch_size)),
            flush_signal: Notify::new(),
            skipped: AtomicU64::new(0),
        }
    }

    /// 追加一个数据点，达到批量上限时唤醒刷新协程
    pub fn add(&self, point: TelemetryPoint) {
        let pending = {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.push(point);
            buffer.len()
        };
        if pending >= self.batch_size {
            self.flush_signal.notify_one();
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 因设备未知而丢弃的数据点数
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// 换出当前缓冲区
    pub fn take_batch(&self) -> Vec<TelemetryPoint> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *buffer, Vec::with_capacity(self.batch_size))
    }

    /// 写出当前缓冲区，返回写入的行数
    ///
    /// 未知设备的数据点直接丢弃；某个超级表结构变更失败时只丢弃该表的数据点。
    pub async fn flush(&self) -> IotResult<usize> {
        let points = self.take_batch();
        if points.is_empty() {
            return Ok(0);
        }
        let started = Instant::now();
        let total = points.len();

        let mut grouped: BTreeMap<String, BTreeMap<String, Vec<TelemetryPoint>>> = BTreeMap::new();
        let mut unknown: BTreeSet<String> = BTreeSet::new();
        for point in points {
            match self.registry.table_of(&point.device_id).await {
                Some(stable) => grouped
                    .entry(stable)
                    .or_default()
                    .entry(point.device_id.clone())
                    .or_default()
                    .push(point),
                None => {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    unknown.insert(point.device_id);
                }
            }
        }
        for device_id in &unknown {
            warn!(device = %device_id, "未知设备，丢弃数据点");
            // 只刷新映射供后续上报使用，本批数据不补写
            if let Err(e) = self.registry.refresh_device(device_id).await {
                debug!(device = %device_id, error = %e, "刷新设备映射失败");
            }
        }

        let mut batches = Vec::new();
        for (stable, devices) in grouped {
            let samples = property_samples(devices.values().flatten());
            if let Err(e) = self.registry.ensure_columns(&stable, &samples).await {
                let dropped: usize = devices.values().map(Vec::len).sum();
                error!(stable = %stable, dropped, error = %e, "超级表结构变更失败，丢弃该表数据");
                continue;
            }
            batches.extend(
                devices
                    .into_iter()
                    .map(|(device_id, points)| build_batch(&stable, device_id, points)),
            );
        }

        if batches.is_empty() {
            return Ok(0);
        }

        let written = self.store.insert(&batches).await?;
        let elapsed = started.elapsed();
        metrics::counter!("tsdb_flush_points_total").increment(written as u64);
        metrics::histogram!("tsdb_flush_duration_seconds").record(elapsed.as_secs_f64());
        debug!(
            points = total,
            written,
            tables = batches.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "批量写入完成"
        );
        Ok(written)
    }

    /// 刷新循环：定时或满批触发，收到关闭信号后做最后一次刷新
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            batch_size = self.batch_size,
            interval_ms = self.flush_interval.as_millis() as u64,
            "时序写入启动"
        );
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(pending = self.pending(), "时序写入收到关闭信号，写出剩余数据");
                    self.flush_logged().await;
                    break;
                }
                _ = ticker.tick() => self.flush_logged().await,
                _ = self.flush_signal.notified() => self.flush_logged().await,
            }
        }
        info!("时序写入已停止");
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            error!(error = %e, "批量写入失败，本批数据丢弃");
        }
    }
}

/// 每个属性取第一个样例值，用于推断未声明属性的列类型
fn property_samples<'a>(points: impl Iterator<Item = &'a TelemetryPoint>) -> BTreeMap<String, Value> {
    let mut samples = BTreeMap::new();
    for point in points {
        for (code, value) in &point.properties {
            if !value.is_null() {
                samples.entry(code.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    samples
}

/// 列按规范化后的列名去重，同一列的多个原始编码取第一个非空值
fn build_batch(stable: &str, device_id: String, points: Vec<TelemetryPoint>) -> SubTableBatch {
    let mut codes: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for point in &points {
        for code in point.properties.keys() {
            codes
                .entry(sanitize_identifier(code))
                .or_default()
                .insert(code.as_str());
        }
    }
    let rows = points
        .iter()
        .map(|point| TableRow {
            ts_millis: point.timestamp_millis(),
            values: codes
                .values()
                .map(|raw| {
                    raw.iter().find_map(|code| {
                        point.properties.get(*code).filter(|v| !v.is_null()).cloned()
                    })
                })
                .collect(),
        })
        .collect();
    let columns = codes.into_keys().collect();
    SubTableBatch {
        stable: stable.to_string(),
        table: device_table_name(&device_id),
        device_id,
        columns,
        rows,
    }
}
