use iothub_core::config::RuleEngineConfig;
use iothub_core::models::{RuleDefinition, RuleStatus};
use iothub_core::traits::RuleEngineClient;
use iothub_core::{IotError, IotResult};
use iothub_domain::StreamNames;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 编译规则所用的数据流名称与命中回调地址
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub streams: StreamNames,
    callback_base_url: String,
}

impl RuleContext {
    pub fn new(streams: StreamNames, callback_base_url: impl Into<String>) -> Self {
        Self {
            streams,
            callback_base_url: callback_base_url.into(),
        }
    }

    pub fn from_config(config: &RuleEngineConfig) -> Self {
        Self::new(
            StreamNames {
                property: config.property_stream.clone(),
                event: config.event_stream.clone(),
                status: config.status_stream.clone(),
            },
            config.callback_base_url.clone(),
        )
    }

    /// `kind` 为 `scene` 或 `alarm`
    pub fn callback_url(&self, kind: &str, id: i64) -> String {
        format!(
            "{}/api/rule/callback/{kind}/{id}",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

/// 单条规则的部署代次与操作锁
#[derive(Default)]
struct RuleSlot {
    generation: u64,
    lock: Arc<tokio::sync::Mutex<()>>,
}

/// 远端规则的部署与生命周期管理
///
/// 同一规则上的部署与停止串行执行。每次部署推进该规则的代次，
/// 经 [`RuleDeployer::stop_later`] 排队的停止若在执行前遇到更新的部署则放弃。
pub struct RuleDeployer {
    client: Arc<dyn RuleEngineClient>,
    stop_timeout: Duration,
    slots: Mutex<HashMap<String, RuleSlot>>,
}

impl RuleDeployer {
    pub fn new(client: Arc<dyn RuleEngineClient>, stop_timeout: Duration) -> Self {
        Self {
            client,
            stop_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// 返回规则当前代次与操作锁，`advance` 为真时先推进代次
    fn slot(&self, rule_id: &str, advance: bool) -> (u64, Arc<tokio::sync::Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(rule_id.to_string()).or_default();
        if advance {
            slot.generation += 1;
        }
        (slot.generation, Arc::clone(&slot.lock))
    }

    /// 同名规则存在则原地更新并重启，否则创建并启动
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn deploy(&self, rule: &RuleDefinition) -> IotResult<()> {
        let (_, lock) = self.slot(&rule.id, true);
        let _guard = lock.lock().await;
        if self.client.rule_exists(&rule.id).await? {
            self.client.update_rule(rule).await?;
            self.client.restart_rule(&rule.id).await?;
            info!("更新并重启远端规则");
        } else {
            self.client.create_rule(rule).await?;
            self.client.start_rule(&rule.id).await?;
            info!("创建并启动远端规则");
        }
        Ok(())
    }

    /// 停止规则，规则不存在视为已停止
    pub async fn stop(&self, rule_id: &str) -> IotResult<()> {
        let (_, lock) = self.slot(rule_id, false);
        let _guard = lock.lock().await;
        self.stop_now(rule_id).await
    }

    /// 生成一个稍后执行的停止操作，调用时记下规则代次
    ///
    /// 返回的 future 执行时若该规则已被重新部署则直接返回成功。
    pub fn stop_later(self: &Arc<Self>, rule_id: &str) -> impl Future<Output = IotResult<()>> + Send + 'static {
        let deployer = Arc::clone(self);
        let rule_id = rule_id.to_string();
        let (generation, lock) = self.slot(&rule_id, false);
        async move {
            let _guard = lock.lock().await;
            let (current, _) = deployer.slot(&rule_id, false);
            if current != generation {
                debug!(rule_id = %rule_id, "规则已重新部署，放弃排队的停止");
                return Ok(());
            }
            deployer.stop_now(&rule_id).await
        }
    }

    async fn stop_now(&self, rule_id: &str) -> IotResult<()> {
        match tokio::time::timeout(self.stop_timeout, self.client.stop_rule(rule_id)).await {
            Ok(Ok(())) => {
                info!(rule_id, "远端规则已停止");
                Ok(())
            }
            Ok(Err(e)) if e.is_not_found() => {
                debug!(rule_id, "远端规则不存在，无需停止");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(rule_id, timeout_ms = self.stop_timeout.as_millis() as u64, "停止远端规则超时");
                Err(IotError::timeout(format!("停止规则 {rule_id}")))
            }
        }
    }

    /// 删除规则，规则不存在视为已删除
    pub async fn delete(&self, rule_id: &str) -> IotResult<()> {
        match self.client.delete_rule(rule_id).await {
            Ok(()) => {
                info!(rule_id, "远端规则已删除");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(rule_id, "远端规则不存在，无需删除");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 远端规则状态，规则不存在时为空
    pub async fn status(&self, rule_id: &str) -> IotResult<Option<RuleStatus>> {
        match self.client.rule_status(rule_id).await {
            Ok(status) => Ok(Some(status)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iothub_testing_utils::MockRuleEngineClient;

    fn rule(id: &str, sql: &str) -> RuleDefinition {
        RuleDefinition::with_callback(id, sql, "http://hub/api/rule/callback/scene/1")
    }

    fn deployer(client: &MockRuleEngineClient) -> RuleDeployer {
        RuleDeployer::new(Arc::new(client.clone()), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_deploy_creates_then_updates() {
        let client = MockRuleEngineClient::new();
        let deployer = deployer(&client);

        deployer.deploy(&rule("scene_1", "SELECT 1")).await.unwrap();
        deployer.deploy(&rule("scene_1", "SELECT 2")).await.unwrap();

        assert_eq!(
            client.calls(),
            vec![
                "exists:scene_1",
                "create:scene_1",
                "start:scene_1",
                "exists:scene_1",
                "update:scene_1",
                "restart:scene_1",
            ]
        );
        assert_eq!(client.rule("scene_1").unwrap().definition.sql, "SELECT 2");
    }

    #[tokio::test]
    async fn test_stop_and_delete_tolerate_missing_rule() {
        let client = MockRuleEngineClient::new();
        let deployer = deployer(&client);

        deployer.stop("ghost").await.unwrap();
        deployer.delete("ghost").await.unwrap();
        assert!(deployer.status("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_propagates_other_errors() {
        let client = MockRuleEngineClient::new();
        let deployer = deployer(&client);
        deployer.deploy(&rule("scene_1", "SELECT 1")).await.unwrap();
        client.fail_on("stop", "engine busy");

        let err = deployer.stop("scene_1").await.unwrap_err();
        assert!(matches!(err, IotError::RuleEngine { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_stop_later_skipped_after_redeploy() {
        let client = MockRuleEngineClient::new();
        let deployer = Arc::new(deployer(&client));
        deployer.deploy(&rule("scene_1", "SELECT 1")).await.unwrap();

        let stale = deployer.stop_later("scene_1");
        deployer.deploy(&rule("scene_1", "SELECT 2")).await.unwrap();
        stale.await.unwrap();

        assert!(client.rule("scene_1").unwrap().running);
        assert!(!client.calls().iter().any(|c| c == "stop:scene_1"));

        deployer.stop_later("scene_1").await.unwrap();
        assert!(!client.rule("scene_1").unwrap().running);
    }

    #[test]
    fn test_callback_url() {
        let context = RuleContext::new(StreamNames::default(), "http://hub:8080/");
        assert_eq!(
            context.callback_url("alarm", 4),
            "http://hub:8080/api/rule/callback/alarm/4"
        );
    }

    #[tokio::test]
    async fn test_status_reports_running_state() {
        let client = MockRuleEngineClient::new();
        let deployer = deployer(&client);
        deployer.deploy(&rule("scene_1", "SELECT 1")).await.unwrap();
        assert!(deployer.status("scene_1").await.unwrap().unwrap().is_running());

        deployer.stop("scene_1").await.unwrap();
        assert!(!deployer.status("scene_1").await.unwrap().unwrap().is_running());
    }
}
