use chrono::{DateTime, Utc};
use iothub_core::traits::DeviceCatalog;
use iothub_core::IotResult;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::status_cache::{DeviceStatusCache, PutOutcome};

/// 根据上报维护设备在线标记
///
/// 缓存命中时不访问设备目录；未命中或过期时最多读一次在线标记，
/// 不在线才写入上线，并刷新最近在线时间供离线巡检使用。
pub struct DeviceStatusTracker {
    cache: Arc<DeviceStatusCache>,
    catalog: Arc<dyn DeviceCatalog>,
}

impl DeviceStatusTracker {
    pub fn new(cache: Arc<DeviceStatusCache>, catalog: Arc<dyn DeviceCatalog>) -> Self {
        Self { cache, catalog }
    }

    pub fn cache(&self) -> &Arc<DeviceStatusCache> {
        &self.cache
    }

    /// 属性上报路径，返回是否发生了上线写入
    #[instrument(skip(self), level = "debug")]
    pub async fn on_property_report(&self, device_id: &str, at: DateTime<Utc>) -> IotResult<bool> {
        if self.cache.is_fresh_at(device_id, at).await {
            return Ok(false);
        }

        let flipped = self.mark_online(device_id, at).await?;
        if self.cache.put_at(device_id, at, at).await == PutOutcome::Dropped {
            debug!(device = device_id, "状态缓存已满，下次上报将再次核对");
        }
        Ok(flipped)
    }

    /// 网关上报的上下线状态
    #[instrument(skip(self))]
    pub async fn on_status_change(&self, device_id: &str, online: bool, at: DateTime<Utc>) -> IotResult<()> {
        if online {
            self.mark_online(device_id, at).await?;
            self.cache.put_at(device_id, at, at).await;
        } else {
            self.cache.remove(device_id).await;
            if self.catalog.is_online(device_id).await? {
                self.catalog.set_online(device_id, false).await?;
                info!(device = device_id, "设备下线");
            }
        }
        Ok(())
    }

    async fn mark_online(&self, device_id: &str, at: DateTime<Utc>) -> IotResult<bool> {
        let flipped = if self.catalog.is_online(device_id).await? {
            false
        } else {
            self.catalog.set_online(device_id, true).await?;
            metrics::counter!("device_status_online_writes_total").increment(1);
            info!(device = device_id, "设备上线");
            true
        };
        self.catalog.set_last_online(device_id, at).await?;
        Ok(flipped)
    }
}
