//! 场景联动
//!
//! 场景的触发条件编译为本地定时任务或远端规则，二者互斥：启动为定时场景时
//! 取消同ID的远端规则，启动为远端规则时取消本地定时任务。命中后按动作列表
//! 经指令关联器下发，渠道为"场景联动"。

use chrono::{DateTime, Local};
use iothub_control::CommandCorrelator;
use iothub_core::models::RuleDefinition;
use iothub_core::{IotError, IotResult, TaskPool};
use iothub_domain::{compile_conditions, scene_rule_id, CompiledTrigger, SceneAction, SceneEntry, WriteChannel};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::deployer::{RuleContext, RuleDeployer};
use crate::scheduler::SceneScheduler;
use crate::ActiveDefinitions;

/// 场景运行状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SceneStatus {
    Cron { next_fire: Option<DateTime<Local>> },
    Remote { status: String },
    Stopped,
}

pub struct SceneService {
    scheduler: Arc<SceneScheduler>,
    deployer: Arc<RuleDeployer>,
    correlator: Arc<CommandCorrelator>,
    tasks: Arc<TaskPool>,
    context: RuleContext,
    active: ActiveDefinitions<SceneEntry>,
}

impl SceneService {
    pub fn new(
        scheduler: Arc<SceneScheduler>,
        deployer: Arc<RuleDeployer>,
        correlator: Arc<CommandCorrelator>,
        tasks: Arc<TaskPool>,
        context: RuleContext,
        active: ActiveDefinitions<SceneEntry>,
    ) -> Self {
        Self {
            scheduler,
            deployer,
            correlator,
            tasks,
            context,
            active,
        }
    }

    /// 启动或重新启动场景
    ///
    /// 远端规则部署失败时场景保持停止状态并返回规则引擎的错误。
    #[instrument(skip(self, scene), fields(scene_id = scene.id))]
    pub async fn start(&self, scene: SceneEntry) -> IotResult<()> {
        if scene.actions.is_empty() {
            return Err(IotError::invalid_rule("场景动作不能为空"));
        }
        let trigger = compile_conditions(&scene.conditions, &self.context.streams)?;
        let scene_id = scene.id;

        match trigger {
            CompiledTrigger::Cron(expr) => {
                let was_remote = self.active.read().await.contains_key(&scene_id)
                    && !self.scheduler.is_registered(scene_id).await;

                let correlator = self.correlator.clone();
                let actions = Arc::new(scene.actions.clone());
                self.scheduler
                    .register(scene_id, &expr, move || {
                        let correlator = correlator.clone();
                        let actions = actions.clone();
                        async move {
                            run_actions(&correlator, scene_id, &actions).await;
                        }
                    })
                    .await?;

                if was_remote {
                    self.stop_remote_detached(scene_id);
                }
                info!(cron = %expr, "场景以定时方式启动");
            }
            CompiledTrigger::Remote(sql) => {
                self.scheduler.cancel(scene_id).await;
                let rule = RuleDefinition::with_callback(
                    scene.rule_id(),
                    sql,
                    self.context.callback_url("scene", scene_id),
                );
                if let Err(e) = self.deployer.deploy(&rule).await {
                    self.active.write().await.remove(&scene_id);
                    self.stop_remote_detached(scene_id);
                    warn!(error = %e, "场景规则部署失败");
                    return Err(e);
                }
                info!(rule_id = %rule.id, "场景以远端规则方式启动");
            }
        }

        self.active.write().await.insert(scene_id, scene);
        Ok(())
    }

    /// 停止场景：同步移除本地定时任务，远端规则的停止在后台执行
    pub async fn stop(&self, scene_id: i64) -> IotResult<()> {
        self.scheduler.cancel(scene_id).await;
        self.active.write().await.remove(&scene_id);
        self.stop_remote_detached(scene_id);
        info!(scene_id, "场景已停止");
        Ok(())
    }

    /// 删除场景：先停止，再删除远端规则
    pub async fn delete(&self, scene_id: i64) -> IotResult<()> {
        self.scheduler.cancel(scene_id).await;
        self.active.write().await.remove(&scene_id);

        let rule_id = scene_rule_id(scene_id);
        if let Err(e) = self.deployer.stop(&rule_id).await {
            warn!(scene_id, error = %e, "删除前停止远端规则失败");
        }
        self.deployer.delete(&rule_id).await?;
        info!(scene_id, "场景已删除");
        Ok(())
    }

    pub async fn status(&self, scene_id: i64) -> IotResult<SceneStatus> {
        if self.scheduler.is_registered(scene_id).await {
            return Ok(SceneStatus::Cron {
                next_fire: self.scheduler.next_fire(scene_id).await,
            });
        }
        match self.deployer.status(&scene_rule_id(scene_id)).await? {
            Some(status) if status.is_running() => Ok(SceneStatus::Remote {
                status: status.status,
            }),
            _ => Ok(SceneStatus::Stopped),
        }
    }

    /// 执行已启动场景的全部动作，返回成功下发的指令序列号
    pub async fn execute(&self, scene_id: i64) -> IotResult<Vec<String>> {
        let scene = self
            .active
            .read()
            .await
            .get(&scene_id)
            .cloned()
            .ok_or(IotError::SceneNotFound { id: scene_id })?;
        Ok(run_actions(&self.correlator, scene_id, &scene.actions).await)
    }

    pub async fn definition(&self, scene_id: i64) -> Option<SceneEntry> {
        self.active.read().await.get(&scene_id).cloned()
    }

    /// 远端停止在后台执行，之后的重新部署会取代尚未执行的停止
    fn stop_remote_detached(&self, scene_id: i64) {
        let rule_id = scene_rule_id(scene_id);
        let stop = self.deployer.stop_later(&rule_id);
        self.tasks.spawn(format!("stop:{rule_id}"), stop);
    }
}

/// 逐个下发动作，单个动作失败不影响其余动作
async fn run_actions(correlator: &CommandCorrelator, scene_id: i64, actions: &[SceneAction]) -> Vec<String> {
    let mut issued = Vec::with_capacity(actions.len());
    for action in actions {
        match correlator
            .deal(
                &action.device_id,
                &action.property,
                &action.value,
                WriteChannel::Scene,
                None,
            )
            .await
        {
            Ok(seq) => issued.push(seq),
            Err(e) => warn!(
                scene_id,
                device = %action.device_id,
                property = %action.property,
                error = %e,
                "场景动作下发失败"
            ),
        }
    }
    metrics::counter!("scene_actions_issued_total").increment(issued.len() as u64);
    issued
}
