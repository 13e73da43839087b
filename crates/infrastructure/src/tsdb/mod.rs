//! TDengine REST 时序库实现

pub mod sql;

use async_trait::async_trait;
use iothub_core::config::TsdbConfig;
use iothub_core::models::{ColumnDef, SubTableBatch};
use iothub_core::traits::TimeSeriesStore;
use iothub_core::{IotError, IotResult};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// REST 接口的统一响应体
#[derive(Debug, Deserialize)]
struct RestResponse {
    code: i64,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

pub struct TdengineRestStore {
    client: reqwest::Client,
    endpoint: String,
    database: String,
    username: String,
    password: String,
}

impl TdengineRestStore {
    pub fn new(config: &TsdbConfig) -> IotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| IotError::Configuration(format!("创建时序库HTTP客户端失败: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/rest/sql", config.url.trim_end_matches('/')),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn execute(&self, sql: &str) -> IotResult<RestResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| IotError::Network(format!("时序库请求失败: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IotError::Network(format!("读取时序库响应失败: {e}")))?;

        let parsed: RestResponse = serde_json::from_str(&body).map_err(|_| {
            IotError::TimeSeries(format!("时序库返回无法解析的响应: HTTP {status} - {body}"))
        })?;

        if parsed.code != 0 {
            return Err(IotError::TimeSeries(format!(
                "[{}] {}",
                parsed.code,
                parsed.desc.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(parsed)
    }
}

fn is_not_exist(err: &IotError) -> bool {
    matches!(err, IotError::TimeSeries(msg) if msg.to_ascii_lowercase().contains("not exist"))
}

fn is_duplicate(err: &IotError) -> bool {
    matches!(err, IotError::TimeSeries(msg) if {
        let msg = msg.to_ascii_lowercase();
        msg.contains("duplicated") || msg.contains("already exist")
    })
}

#[async_trait]
impl TimeSeriesStore for TdengineRestStore {
    #[instrument(skip(self))]
    async fn describe(&self, stable: &str) -> IotResult<Option<Vec<String>>> {
        match self.execute(&sql::describe(&self.database, stable)).await {
            Ok(response) => Ok(Some(sql::data_columns(&response.data))),
            Err(e) if is_not_exist(&e) => {
                debug!("超级表 {} 不存在", stable);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, columns), fields(columns = columns.len()))]
    async fn create_stable(&self, stable: &str, columns: &[ColumnDef]) -> IotResult<()> {
        match self
            .execute(&sql::create_stable(&self.database, stable, columns))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, column), fields(column = %column.name))]
    async fn add_column(&self, stable: &str, column: &ColumnDef) -> IotResult<()> {
        match self
            .execute(&sql::add_column(&self.database, stable, column))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate(&e) => {
                debug!("列 {}.{} 已存在", stable, column.name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, batches: &[SubTableBatch]) -> IotResult<usize> {
        let Some(statement) = sql::insert(&self.database, batches) else {
            return Ok(0);
        };
        let expected: usize = batches.iter().map(|b| b.rows.len()).sum();
        let response = self.execute(&statement).await?;
        // 写入语句的响应为单行 affected_rows
        let affected = response
            .data
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .map(|n| n.max(0) as usize)
            .unwrap_or(expected);
        if affected != expected {
            warn!(expected, affected, "时序库写入行数与预期不符");
        }
        Ok(affected)
    }
}
