use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iothub_core::{IotError, IotResult};
use iothub_domain::{WriteCompletion, WriteLog, WriteLogRepository, WriteStatus};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};

const SELECT_COLUMNS: &str = "seq, device_id, gateway_id, property, value, channel, status, requester, response_value, reason, latency_ms, created_at, completed_at";

pub struct PostgresWriteLogRepository {
    pool: PgPool,
}

impl PostgresWriteLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_write_log(row: &sqlx::postgres::PgRow) -> IotResult<WriteLog> {
        let channel: String = row.try_get("channel")?;
        let status: String = row.try_get("status")?;
        Ok(WriteLog {
            seq: row.try_get("seq")?,
            device_id: row.try_get("device_id")?,
            gateway_id: row.try_get("gateway_id")?,
            property: row.try_get("property")?,
            value: row.try_get("value")?,
            channel: channel.parse()?,
            status: status.parse()?,
            requester: row.try_get("requester")?,
            response_value: row.try_get("response_value")?,
            reason: row.try_get("reason")?,
            latency_ms: row.try_get("latency_ms")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl WriteLogRepository for PostgresWriteLogRepository {
    #[instrument(skip(self, log), fields(seq = %log.seq, device = %log.device_id))]
    async fn insert(&self, log: &WriteLog) -> IotResult<()> {
        sqlx::query(
            r#"
            INSERT INTO write_logs (seq, device_id, gateway_id, property, value, channel, status, requester, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&log.seq)
        .bind(&log.device_id)
        .bind(&log.gateway_id)
        .bind(&log.property)
        .bind(&log.value)
        .bind(log.channel.as_str())
        .bind(log.status.as_str())
        .bind(log.requester)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IotError::DatabaseOperation(format!("保存指令日志 {} 失败: {e}", log.seq)))?;

        debug!("保存指令日志成功: {}", log.seq);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_seq(&self, seq: &str) -> IotResult<Option<WriteLog>> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM write_logs WHERE seq = $1"))
            .bind(seq)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_write_log).transpose()
    }

    #[instrument(skip(self, completion), fields(status = %completion.status))]
    async fn complete(&self, seq: &str, completion: &WriteCompletion) -> IotResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE write_logs
            SET status = $2, response_value = $3, reason = $4, completed_at = $5,
                latency_ms = GREATEST(0, (EXTRACT(EPOCH FROM ($5 - created_at)) * 1000)::BIGINT)
            WHERE seq = $1 AND status = $6
            "#,
        )
        .bind(seq)
        .bind(completion.status.as_str())
        .bind(&completion.response_value)
        .bind(&completion.reason)
        .bind(completion.completed_at)
        .bind(WriteStatus::Waiting.as_str())
        .execute(&self.pool)
        .await?;

        let transitioned = result.rows_affected() == 1;
        if !transitioned {
            debug!("指令 {} 已处于终态或不存在，忽略更新", seq);
        }
        Ok(transitioned)
    }

    #[instrument(skip(self))]
    async fn expire_waiting(&self, cutoff: DateTime<Utc>, reason: &str) -> IotResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE write_logs
            SET status = $3, reason = $2, completed_at = NOW(),
                latency_ms = GREATEST(0, (EXTRACT(EPOCH FROM (NOW() - created_at)) * 1000)::BIGINT)
            WHERE status = $4 AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(reason)
        .bind(WriteStatus::Fail.as_str())
        .bind(WriteStatus::Waiting.as_str())
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            warn!("{} 条等待中的指令超时，已置为失败", expired);
        }
        Ok(expired)
    }
}
