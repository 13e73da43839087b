//! 设备在线状态缓存
//!
//! 记录每台设备最近一次确认在线的时间。读多写少：已在线设备的上报只取读锁，
//! 状态迁移与淘汰取写锁。容量满时先清理过期条目，仍然满则丢弃新条目，
//! 不淘汰仍然有效的条目。

use chrono::{DateTime, Duration, Utc};
use iothub_core::config::StatusCacheConfig;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// 已有条目，更新时间
    Refreshed,
    /// 新增条目，`evicted` 为插入前清理的过期条目数
    Inserted { evicted: usize },
    /// 清理后仍然满，新条目被丢弃
    Dropped,
}

pub struct DeviceStatusCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl DeviceStatusCache {
    pub fn new(ttl: std::time::Duration, max_entries: usize) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(300)),
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &StatusCacheConfig) -> Self {
        Self::new(
            std::time::Duration::from_secs(config.ttl_seconds),
            config.max_entries,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, device_id: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(device_id).copied()
    }

    pub async fn is_fresh(&self, device_id: &str) -> bool {
        self.is_fresh_at(device_id, Utc::now()).await
    }

    pub async fn is_fresh_at(&self, device_id: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .await
            .get(device_id)
            .is_some_and(|seen| now - *seen < self.ttl)
    }

    pub async fn put(&self, device_id: &str, seen: DateTime<Utc>) -> PutOutcome {
        self.put_at(device_id, seen, Utc::now()).await
    }

    pub async fn put_at(&self, device_id: &str, seen: DateTime<Utc>, now: DateTime<Utc>) -> PutOutcome {
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get_mut(device_id) {
            if seen > *existing {
                *existing = seen;
            }
            return PutOutcome::Refreshed;
        }

        let mut evicted = 0;
        if entries.len() >= self.max_entries {
            evicted = Self::evict_expired(&mut entries, now, self.ttl);
            if entries.len() >= self.max_entries {
                warn!(
                    device = device_id,
                    capacity = self.max_entries,
                    "状态缓存已满，丢弃新条目"
                );
                return PutOutcome::Dropped;
            }
        }

        entries.insert(device_id.to_string(), seen);
        PutOutcome::Inserted { evicted }
    }

    /// 清理所有过期条目，返回清理数量
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        Self::evict_expired(&mut entries, now, self.ttl)
    }

    pub async fn remove(&self, device_id: &str) -> bool {
        self.entries.write().await.remove(device_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn evict_expired(
        entries: &mut HashMap<String, DateTime<Utc>>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, seen| now - *seen < ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "清理过期状态缓存");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max: usize) -> DeviceStatusCache {
        DeviceStatusCache::new(std::time::Duration::from_secs(60), max)
    }

    #[tokio::test]
    async fn test_fresh_until_ttl() {
        let cache = cache(10);
        let t0 = Utc::now();
        cache.put_at("d1", t0, t0).await;

        assert!(cache.is_fresh_at("d1", t0 + Duration::seconds(59)).await);
        assert!(!cache.is_fresh_at("d1", t0 + Duration::seconds(60)).await);
        assert!(!cache.is_fresh_at("d2", t0).await);
    }

    #[tokio::test]
    async fn test_refresh_keeps_latest() {
        let cache = cache(10);
        let t0 = Utc::now();
        cache.put_at("d1", t0, t0).await;

        let outcome = cache.put_at("d1", t0 - Duration::seconds(5), t0).await;
        assert_eq!(outcome, PutOutcome::Refreshed);
        assert_eq!(cache.get("d1").await, Some(t0));
    }

    #[tokio::test]
    async fn test_full_cache_sweeps_expired_first() {
        let cache = cache(2);
        let t0 = Utc::now();
        cache.put_at("old", t0 - Duration::seconds(120), t0).await;
        cache.put_at("live", t0, t0).await;

        let outcome = cache.put_at("new", t0, t0).await;
        assert_eq!(outcome, PutOutcome::Inserted { evicted: 1 });
        assert!(cache.get("old").await.is_none());
        assert!(cache.get("live").await.is_some());
        assert!(cache.get("new").await.is_some());
    }

    #[tokio::test]
    async fn test_full_cache_of_live_entries_drops_new() {
        let cache = cache(2);
        let t0 = Utc::now();
        cache.put_at("a", t0, t0).await;
        cache.put_at("b", t0, t0).await;

        assert_eq!(cache.put_at("c", t0, t0).await, PutOutcome::Dropped);
        assert_eq!(cache.len().await, 2);
        assert!(cache.get("c").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_and_remove() {
        let cache = cache(10);
        let t0 = Utc::now();
        cache.put_at("a", t0 - Duration::seconds(61), t0).await;
        cache.put_at("b", t0, t0).await;

        assert_eq!(cache.sweep_at(t0).await, 1);
        assert!(cache.remove("b").await);
        assert!(!cache.remove("b").await);
        assert!(cache.is_empty().await);
    }
}
