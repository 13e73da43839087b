//! 规则引擎异常时的调用序列

mod common;

use async_trait::async_trait;
use common::harness_with_engine;
use iothub_core::models::{RuleDefinition, RuleStatus};
use iothub_core::traits::RuleEngineClient;
use iothub_core::{IotError, IotResult};
use iothub_testing_utils::{data_condition, MockRuleEngineClient, SceneBuilder};
use mockall::mock;
use std::sync::Arc;

mock! {
    pub Engine {}

    #[async_trait]
    impl RuleEngineClient for Engine {
        async fn rule_exists(&self, rule_id: &str) -> IotResult<bool>;
        async fn create_rule(&self, rule: &RuleDefinition) -> IotResult<()>;
        async fn update_rule(&self, rule: &RuleDefinition) -> IotResult<()>;
        async fn delete_rule(&self, rule_id: &str) -> IotResult<()>;
        async fn start_rule(&self, rule_id: &str) -> IotResult<()>;
        async fn stop_rule(&self, rule_id: &str) -> IotResult<()>;
        async fn restart_rule(&self, rule_id: &str) -> IotResult<()>;
        async fn rule_status(&self, rule_id: &str) -> IotResult<RuleStatus>;
    }
}

fn engine_error(status: u16, message: &str) -> IotError {
    IotError::RuleEngine {
        status,
        message: message.to_string(),
    }
}

fn scene() -> iothub_domain::SceneEntry {
    SceneBuilder::new(1)
        .with_condition(data_condition(&["fan"], "temp", ">", "30", None))
        .with_action("lamp", "switch", "1")
        .build()
}

#[tokio::test]
async fn test_existence_check_failure_aborts_deploy() {
    let mut engine = MockEngine::new();
    engine
        .expect_rule_exists()
        .times(1)
        .returning(|_| Err(engine_error(503, "unavailable")));
    engine.expect_create_rule().times(0);
    engine.expect_update_rule().times(0);
    // 部署失败后后台停止残留规则
    engine.expect_stop_rule().returning(|_| Ok(()));

    let h = harness_with_engine(Arc::new(engine), MockRuleEngineClient::new());
    let err = h.scenes.start(scene()).await.unwrap_err();
    assert!(matches!(err, IotError::RuleEngine { status: 503, .. }));
    h.tasks.drain().await;
    assert!(h.scenes.definition(1).await.is_none());
}

#[tokio::test]
async fn test_update_failure_skips_restart() {
    let mut engine = MockEngine::new();
    engine.expect_rule_exists().times(1).returning(|_| Ok(true));
    engine
        .expect_update_rule()
        .times(1)
        .returning(|_| Err(engine_error(400, "parse error")));
    engine.expect_restart_rule().times(0);
    engine.expect_stop_rule().returning(|_| Ok(()));

    let h = harness_with_engine(Arc::new(engine), MockRuleEngineClient::new());
    let err = h.scenes.start(scene()).await.unwrap_err();
    assert!(err.to_string().contains("parse error"));
    h.tasks.drain().await;
}

#[tokio::test]
async fn test_delete_continues_after_stop_failure() {
    let mut engine = MockEngine::new();
    engine
        .expect_stop_rule()
        .times(1)
        .returning(|_| Err(engine_error(500, "internal")));
    engine.expect_delete_rule().times(1).returning(|_| Ok(()));

    let h = harness_with_engine(Arc::new(engine), MockRuleEngineClient::new());
    h.scenes.delete(1).await.unwrap();
}

#[tokio::test]
async fn test_delete_surfaces_remote_failure() {
    let mut engine = MockEngine::new();
    engine.expect_stop_rule().returning(|_| Ok(()));
    engine
        .expect_delete_rule()
        .times(1)
        .returning(|_| Err(engine_error(500, "disk full")));

    let h = harness_with_engine(Arc::new(engine), MockRuleEngineClient::new());
    let err = h.scenes.delete(1).await.unwrap_err();
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_status_error_propagates() {
    let mut engine = MockEngine::new();
    engine
        .expect_rule_status()
        .times(1)
        .returning(|_| Err(engine_error(502, "bad gateway")));

    let h = harness_with_engine(Arc::new(engine), MockRuleEngineClient::new());
    assert!(h.scenes.status(1).await.is_err());
}
