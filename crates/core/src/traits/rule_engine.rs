use async_trait::async_trait;

use crate::{
    models::{RuleDefinition, RuleStatus},
    IotResult,
};

/// 远端流式规则引擎的规则管理接口
///
/// 规则不存在时实现应返回 `IotError::RemoteNotFound`，
/// 以便停止/删除流程按"已满足"处理。
#[async_trait]
pub trait RuleEngineClient: Send + Sync {
    async fn rule_exists(&self, rule_id: &str) -> IotResult<bool>;
    async fn create_rule(&self, rule: &RuleDefinition) -> IotResult<()>;
    async fn update_rule(&self, rule: &RuleDefinition) -> IotResult<()>;
    async fn delete_rule(&self, rule_id: &str) -> IotResult<()>;
    async fn start_rule(&self, rule_id: &str) -> IotResult<()>;
    async fn stop_rule(&self, rule_id: &str) -> IotResult<()>;
    async fn restart_rule(&self, rule_id: &str) -> IotResult<()>;
    async fn rule_status(&self, rule_id: &str) -> IotResult<RuleStatus>;
}
