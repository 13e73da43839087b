use async_trait::async_trait;
use iothub_core::IotResult;
use iothub_domain::{AlertRecord, AlertRepository};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

pub struct PostgresAlertRepository {
    pool: PgPool,
}

impl PostgresAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRepository for PostgresAlertRepository {
    #[instrument(skip(self, record), fields(source = record.source.as_str(), code = %record.code))]
    async fn insert(&self, record: &AlertRecord) -> IotResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO alert_records (source, rule_id, device_id, code, level, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(record.source.as_str())
        .bind(record.rule_id)
        .bind(&record.device_id)
        .bind(&record.code)
        .bind(&record.level)
        .bind(&record.payload)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!("保存告警记录成功: ID {}", id);
        Ok(id)
    }
}
