//! eKuiper REST 规则管理客户端

use async_trait::async_trait;
use iothub_core::config::RuleEngineConfig;
use iothub_core::models::{RuleDefinition, RuleStatus};
use iothub_core::traits::RuleEngineClient;
use iothub_core::{IotError, IotResult};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::timeout_handler::with_timeout;

pub struct EkuiperClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl EkuiperClient {
    pub fn new(config: &RuleEngineConfig) -> IotResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| IotError::Configuration(format!("创建规则引擎HTTP客户端失败: {e}")))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    async fn call(&self, method: Method, path: &str, body: Option<&RuleDefinition>) -> IotResult<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        let operation = format!("{method} {path}");
        with_timeout(self.timeout, "规则引擎", &operation, async {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(rule) = body {
                request = request.json(rule);
            }
            let response = request
                .send()
                .await
                .map_err(|e| IotError::Network(format!("规则引擎请求失败 {url}: {e}")))?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Ok((status, text))
        })
        .await
    }

    /// 非 2xx 响应转换为错误，"不存在"单独区分
    async fn expect_success(&self, method: Method, path: &str, rule_id: &str, body: Option<&RuleDefinition>) -> IotResult<String> {
        let (status, text) = self.call(method, path, body).await?;
        if status.is_success() {
            return Ok(text);
        }
        if is_not_found_response(status, &text) {
            return Err(IotError::RemoteNotFound(format!("规则 {rule_id} 不存在")));
        }
        Err(IotError::RuleEngine {
            status: status.as_u16(),
            message: text,
        })
    }
}

/// eKuiper 对不存在的规则可能返回 404，也可能返回 400 并在消息中说明
fn is_not_found_response(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST && body.to_ascii_lowercase().contains("not found"))
}

#[async_trait]
impl RuleEngineClient for EkuiperClient {
    #[instrument(skip(self))]
    async fn rule_exists(&self, rule_id: &str) -> IotResult<bool> {
        let (status, text) = self.call(Method::GET, &format!("/rules/{rule_id}"), None).await?;
        if status.is_success() {
            Ok(true)
        } else if is_not_found_response(status, &text) {
            Ok(false)
        } else {
            Err(IotError::RuleEngine {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    async fn create_rule(&self, rule: &RuleDefinition) -> IotResult<()> {
        self.expect_success(Method::POST, "/rules", &rule.id, Some(rule)).await?;
        info!("创建规则成功: {}", rule.id);
        Ok(())
    }

    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    async fn update_rule(&self, rule: &RuleDefinition) -> IotResult<()> {
        self.expect_success(Method::PUT, &format!("/rules/{}", rule.id), &rule.id, Some(rule))
            .await?;
        info!("更新规则成功: {}", rule.id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_rule(&self, rule_id: &str) -> IotResult<()> {
        self.expect_success(Method::DELETE, &format!("/rules/{rule_id}"), rule_id, None)
            .await?;
        info!("删除规则成功: {}", rule_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn start_rule(&self, rule_id: &str) -> IotResult<()> {
        self.expect_success(Method::POST, &format!("/rules/{rule_id}/start"), rule_id, None)
            .await?;
        debug!("启动规则: {}", rule_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_rule(&self, rule_id: &str) -> IotResult<()> {
        self.expect_success(Method::POST, &format!("/rules/{rule_id}/stop"), rule_id, None)
            .await?;
        debug!("停止规则: {}", rule_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn restart_rule(&self, rule_id: &str) -> IotResult<()> {
        self.expect_success(Method::POST, &format!("/rules/{rule_id}/restart"), rule_id, None)
            .await?;
        debug!("重启规则: {}", rule_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rule_status(&self, rule_id: &str) -> IotResult<RuleStatus> {
        let text = self
            .expect_success(Method::GET, &format!("/rules/{rule_id}/status"), rule_id, None)
            .await?;
        let detail: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        let status = detail
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Ok(RuleStatus { status, detail })
    }
}
