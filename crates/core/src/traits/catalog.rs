use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::{models::PropertySpec, IotResult};

/// 设备目录：设备与超级表的归属、网关绑定、在线标记等属性
#[async_trait]
pub trait DeviceCatalog: Send + Sync {
    /// 启动时批量加载 设备ID → 超级表名
    async fn load_table_mapping(&self) -> IotResult<HashMap<String, String>>;

    /// 单个设备的超级表，用于未知设备的懒加载
    async fn table_of(&self, device_id: &str) -> IotResult<Option<String>>;

    /// 超级表（产品）声明的属性
    async fn property_specs(&self, stable: &str) -> IotResult<Vec<PropertySpec>>;

    async fn gateway_of(&self, device_id: &str) -> IotResult<Option<String>>;

    async fn is_online(&self, device_id: &str) -> IotResult<bool>;

    async fn set_online(&self, device_id: &str, online: bool) -> IotResult<()>;

    async fn last_online(&self, device_id: &str) -> IotResult<Option<DateTime<Utc>>>;

    async fn set_last_online(&self, device_id: &str, at: DateTime<Utc>) -> IotResult<()>;

    /// 当前标记为在线的设备
    async fn online_devices(&self) -> IotResult<Vec<String>>;
}
