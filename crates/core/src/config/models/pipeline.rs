use serde::{Deserialize, Serialize};

/// 接入分发与工作池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    pub forward_queue_capacity: usize,
    pub forward_workers: usize,
    pub event_queue_capacity: usize,
    pub event_workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10000,
            workers: 16,
            forward_queue_capacity: 10000,
            forward_workers: 4,
            event_queue_capacity: 2000,
            event_workers: 2,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let pairs = [
            ("接入", self.queue_capacity, self.workers),
            ("转发", self.forward_queue_capacity, self.forward_workers),
            ("事件", self.event_queue_capacity, self.event_workers),
        ];
        for (name, capacity, workers) in pairs {
            if capacity == 0 {
                return Err(anyhow::anyhow!("{}队列容量必须大于0", name));
            }
            if workers == 0 {
                return Err(anyhow::anyhow!("{}工作协程数必须大于0", name));
            }
        }
        Ok(())
    }
}

/// 时序批量写入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            flush_interval_ms: 1000,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("批量写入大小必须大于0"));
        }
        if self.flush_interval_ms == 0 {
            return Err(anyhow::anyhow!("刷新间隔必须大于0"));
        }
        Ok(())
    }
}

/// 设备在线状态缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusCacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
    /// 超过该时长未上报的设备由后台巡检标记离线
    pub offline_after_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for StatusCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_entries: 100_000,
            offline_after_seconds: 1800,
            sweep_interval_seconds: 60,
        }
    }
}

impl StatusCacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ttl_seconds == 0 {
            return Err(anyhow::anyhow!("状态缓存TTL必须大于0"));
        }
        if self.max_entries == 0 {
            return Err(anyhow::anyhow!("状态缓存容量必须大于0"));
        }
        if self.offline_after_seconds <= self.ttl_seconds {
            return Err(anyhow::anyhow!("离线判定窗口必须大于状态缓存TTL"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!("离线巡检间隔必须大于0"));
        }
        Ok(())
    }
}

/// 设备控制指令配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// 同步下发时等待应答的时长
    pub wait_timeout_ms: u64,
    /// 等待中的指令超过该时长被巡检置为失败，0 表示不清理
    pub expire_after_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 3000,
            expire_after_seconds: 600,
            sweep_interval_seconds: 60,
        }
    }
}

impl CommandConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.wait_timeout_ms == 0 {
            return Err(anyhow::anyhow!("指令等待超时必须大于0"));
        }
        if self.expire_after_seconds > 0 {
            if self.expire_after_seconds * 1000 <= self.wait_timeout_ms {
                return Err(anyhow::anyhow!("指令过期时间必须大于同步等待时间"));
            }
            if self.sweep_interval_seconds == 0 {
                return Err(anyhow::anyhow!("指令巡检间隔必须大于0"));
            }
        }
        Ok(())
    }
}
