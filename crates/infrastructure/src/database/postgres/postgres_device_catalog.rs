use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iothub_core::models::{PropertySpec, ValueKind};
use iothub_core::traits::DeviceCatalog;
use iothub_core::IotResult;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

const LAST_ONLINE_KEY: &str = "last_online";

/// 基于 Postgres 的设备目录
pub struct PostgresDeviceCatalog {
    pool: PgPool,
}

impl PostgresDeviceCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceCatalog for PostgresDeviceCatalog {
    #[instrument(skip(self))]
    async fn load_table_mapping(&self) -> IotResult<HashMap<String, String>> {
        let rows = sqlx::query("SELECT device_id, stable_name FROM devices")
            .fetch_all(&self.pool)
            .await?;

        let mut mapping = HashMap::with_capacity(rows.len());
        for row in &rows {
            mapping.insert(row.try_get("device_id")?, row.try_get("stable_name")?);
        }
        info!("加载设备归属 {} 条", mapping.len());
        Ok(mapping)
    }

    #[instrument(skip(self))]
    async fn table_of(&self, device_id: &str) -> IotResult<Option<String>> {
        let row = sqlx::query("SELECT stable_name FROM devices WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("stable_name")).transpose().map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn property_specs(&self, stable: &str) -> IotResult<Vec<PropertySpec>> {
        let rows = sqlx::query(
            "SELECT code, value_type, max_length FROM product_properties WHERE stable_name = $1",
        )
        .bind(stable)
        .fetch_all(&self.pool)
        .await?;

        let mut specs = Vec::with_capacity(rows.len());
        for row in &rows {
            let code: String = row.try_get("code")?;
            let value_type: String = row.try_get("value_type")?;
            let max_length: Option<i32> = row.try_get("max_length")?;
            match ValueKind::parse(&value_type) {
                Some(kind) => specs.push(PropertySpec {
                    code,
                    kind,
                    length: max_length.and_then(|l| u32::try_from(l).ok()),
                }),
                None => warn!("属性 {}.{} 的类型 {} 无法映射，按上报值推断", stable, code, value_type),
            }
        }
        Ok(specs)
    }

    #[instrument(skip(self))]
    async fn gateway_of(&self, device_id: &str) -> IotResult<Option<String>> {
        let row = sqlx::query("SELECT gateway_id FROM devices WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| r.try_get::<Option<String>, _>("gateway_id"))
            .transpose()?
            .flatten()
            .filter(|gw| !gw.is_empty()))
    }

    async fn is_online(&self, device_id: &str) -> IotResult<bool> {
        let row = sqlx::query("SELECT online FROM devices WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => row.try_get("online")?,
            None => false,
        })
    }

    #[instrument(skip(self))]
    async fn set_online(&self, device_id: &str, online: bool) -> IotResult<()> {
        let result = sqlx::query("UPDATE devices SET online = $2 WHERE device_id = $1")
            .bind(device_id)
            .bind(online)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            warn!("设备 {} 不在目录中，忽略在线状态更新", device_id);
        } else {
            debug!("设备 {} 在线状态更新为 {}", device_id, online);
        }
        Ok(())
    }

    async fn last_online(&self, device_id: &str) -> IotResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT attr_value FROM device_attributes WHERE device_id = $1 AND attr_key = $2",
        )
        .bind(device_id)
        .bind(LAST_ONLINE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("attr_value")?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(e) => {
                warn!("设备 {} 的最后在线时间无法解析: {} ({})", device_id, raw, e);
                Ok(None)
            }
        }
    }

    async fn set_last_online(&self, device_id: &str, at: DateTime<Utc>) -> IotResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_attributes (device_id, attr_key, attr_value, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (device_id, attr_key)
            DO UPDATE SET attr_value = EXCLUDED.attr_value, updated_at = NOW()
            "#,
        )
        .bind(device_id)
        .bind(LAST_ONLINE_KEY)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn online_devices(&self) -> IotResult<Vec<String>> {
        let rows = sqlx::query("SELECT device_id FROM devices WHERE online")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get("device_id").map_err(Into::into))
            .collect()
    }
}
