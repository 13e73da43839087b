use chrono::{DateTime, Duration, Utc};
use iothub_core::config::StatusCacheConfig;
use iothub_core::traits::DeviceCatalog;
use iothub_core::IotResult;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::status_cache::DeviceStatusCache;

/// 离线巡检：长时间未上报的在线设备被显式标记为离线
pub struct OfflineSweeper {
    catalog: Arc<dyn DeviceCatalog>,
    cache: Arc<DeviceStatusCache>,
    offline_after: Duration,
    interval: std::time::Duration,
}

impl OfflineSweeper {
    pub fn new(
        catalog: Arc<dyn DeviceCatalog>,
        cache: Arc<DeviceStatusCache>,
        config: &StatusCacheConfig,
    ) -> Self {
        Self {
            catalog,
            cache,
            offline_after: Duration::seconds(config.offline_after_seconds as i64),
            interval: std::time::Duration::from_secs(config.sweep_interval_seconds),
        }
    }

    pub async fn sweep_once(&self) -> IotResult<usize> {
        self.sweep_once_at(Utc::now()).await
    }

    /// 返回本轮标记离线的设备数，单台设备的失败只记录日志
    pub async fn sweep_once_at(&self, now: DateTime<Utc>) -> IotResult<usize> {
        self.cache.sweep_at(now).await;

        let mut marked = 0;
        for device_id in self.catalog.online_devices().await? {
            if self.cache.is_fresh_at(&device_id, now).await {
                continue;
            }
            match self.is_silent(&device_id, now).await {
                Ok(false) => {}
                Ok(true) => match self.catalog.set_online(&device_id, false).await {
                    Ok(()) => {
                        self.cache.remove(&device_id).await;
                        info!(device = %device_id, "设备长时间未上报，标记离线");
                        marked += 1;
                    }
                    Err(e) => warn!(device = %device_id, error = %e, "标记离线失败"),
                },
                Err(e) => warn!(device = %device_id, error = %e, "读取最近在线时间失败"),
            }
        }
        Ok(marked)
    }

    async fn is_silent(&self, device_id: &str, now: DateTime<Utc>) -> IotResult<bool> {
        Ok(match self.catalog.last_online(device_id).await? {
            Some(last) => now - last >= self.offline_after,
            None => true,
        })
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "离线巡检启动");
        let mut ticker = tokio::time::interval(self.interval);
        // 首次 tick 立即返回
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("离线巡检收到关闭信号");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(0) => debug!("离线巡检完成，无设备离线"),
                        Ok(n) => info!(marked = n, "离线巡检完成"),
                        Err(e) => error!(error = %e, "离线巡检失败"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iothub_testing_utils::MockDeviceCatalog;

    fn setup(catalog: &MockDeviceCatalog) -> (OfflineSweeper, Arc<DeviceStatusCache>) {
        let config = StatusCacheConfig {
            ttl_seconds: 300,
            offline_after_seconds: 1800,
            ..Default::default()
        };
        let cache = Arc::new(DeviceStatusCache::from_config(&config));
        let sweeper = OfflineSweeper::new(Arc::new(catalog.clone()), cache.clone(), &config);
        (sweeper, cache)
    }

    #[tokio::test]
    async fn test_silent_devices_marked_offline() {
        let now = Utc::now();
        let catalog = MockDeviceCatalog::new()
            .with_device("quiet", "meter", None)
            .with_device("recent", "meter", None)
            .with_device("never", "meter", None)
            .with_device("offline", "meter", None);
        catalog.preset("quiet", true, Some(now - Duration::seconds(3600)));
        catalog.preset("recent", true, Some(now - Duration::seconds(600)));
        catalog.preset("never", true, None);

        let (sweeper, _) = setup(&catalog);
        assert_eq!(sweeper.sweep_once_at(now).await.unwrap(), 2);

        assert!(!catalog.device("quiet").unwrap().online);
        assert!(!catalog.device("never").unwrap().online);
        assert!(catalog.device("recent").unwrap().online);
        assert_eq!(catalog.offline_writes(), 2);
    }

    #[tokio::test]
    async fn test_fresh_cache_entry_skips_catalog_check() {
        let now = Utc::now();
        let catalog = MockDeviceCatalog::new().with_device("d1", "meter", None);
        catalog.preset("d1", true, Some(now - Duration::seconds(7200)));

        let (sweeper, cache) = setup(&catalog);
        cache.put_at("d1", now, now).await;

        assert_eq!(sweeper.sweep_once_at(now).await.unwrap(), 0);
        assert!(catalog.device("d1").unwrap().online);
    }
}
