//! 告警规则
//!
//! 告警条件只编译为远端规则；规则命中回调时落库一条告警记录，
//! 并在通知生效时段内把通知作为后台任务分发到各渠道。

use chrono::{Local, NaiveTime};
use iothub_core::models::RuleDefinition;
use iothub_core::{IotError, IotResult, TaskPool};
use iothub_domain::{
    alarm_rule_id, compile_conditions, AlarmRule, AlertRecord, AlertRepository, CompiledTrigger,
    Notifier,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::deployer::{RuleContext, RuleDeployer};
use crate::ActiveDefinitions;

pub struct AlarmRuleService {
    deployer: Arc<RuleDeployer>,
    alerts: Arc<dyn AlertRepository>,
    notifiers: HashMap<String, Arc<dyn Notifier>>,
    tasks: Arc<TaskPool>,
    context: RuleContext,
    active: ActiveDefinitions<AlarmRule>,
}

impl AlarmRuleService {
    pub fn new(
        deployer: Arc<RuleDeployer>,
        alerts: Arc<dyn AlertRepository>,
        notifiers: Vec<Arc<dyn Notifier>>,
        tasks: Arc<TaskPool>,
        context: RuleContext,
        active: ActiveDefinitions<AlarmRule>,
    ) -> Self {
        let notifiers = notifiers
            .into_iter()
            .map(|n| (n.kind().to_string(), n))
            .collect();
        Self {
            deployer,
            alerts,
            notifiers,
            tasks,
            context,
            active,
        }
    }

    /// 部署或更新告警规则
    #[instrument(skip(self, rule), fields(alarm_id = rule.id))]
    pub async fn apply(&self, rule: AlarmRule) -> IotResult<()> {
        let sql = match compile_conditions(&rule.conditions, &self.context.streams)? {
            CompiledTrigger::Remote(sql) => sql,
            CompiledTrigger::Cron(_) => {
                return Err(IotError::invalid_rule("告警规则不支持定时触发"));
            }
        };
        rule.notify.window()?;
        for sink in &rule.notify.sinks {
            if !self.notifiers.contains_key(&sink.kind) {
                return Err(IotError::invalid_rule(format!(
                    "不支持的通知渠道: {}",
                    sink.kind
                )));
            }
        }

        let definition = RuleDefinition::with_callback(
            rule.rule_id(),
            sql,
            self.context.callback_url("alarm", rule.id),
        );
        if let Err(e) = self.deployer.deploy(&definition).await {
            self.active.write().await.remove(&rule.id);
            // 部署可能中途失败，远端残留的规则需要停下
            self.stop_remote_detached(rule.id);
            warn!(error = %e, "告警规则部署失败");
            return Err(e);
        }
        info!(rule_id = %definition.id, sinks = rule.notify.sinks.len(), "告警规则已部署");
        self.active.write().await.insert(rule.id, rule);
        Ok(())
    }

    /// 停止告警规则，远端停止在后台执行
    pub async fn stop(&self, alarm_id: i64) -> IotResult<()> {
        self.active.write().await.remove(&alarm_id);
        self.stop_remote_detached(alarm_id);
        info!(alarm_id, "告警规则已停止");
        Ok(())
    }

    pub async fn delete(&self, alarm_id: i64) -> IotResult<()> {
        self.active.write().await.remove(&alarm_id);
        let rule_id = alarm_rule_id(alarm_id);
        if let Err(e) = self.deployer.stop(&rule_id).await {
            warn!(alarm_id, error = %e, "删除前停止远端规则失败");
        }
        self.deployer.delete(&rule_id).await?;
        info!(alarm_id, "告警规则已删除");
        Ok(())
    }

    fn stop_remote_detached(&self, alarm_id: i64) {
        let rule_id = alarm_rule_id(alarm_id);
        let stop = self.deployer.stop_later(&rule_id);
        self.tasks.spawn(format!("stop:{rule_id}"), stop);
    }

    /// 处理规则命中回调，返回告警记录ID
    pub async fn on_callback(&self, alarm_id: i64, payload: Value) -> IotResult<i64> {
        self.on_callback_at(alarm_id, payload, Local::now().time()).await
    }

    pub async fn on_callback_at(&self, alarm_id: i64, payload: Value, now: NaiveTime) -> IotResult<i64> {
        let rule = self
            .active
            .read()
            .await
            .get(&alarm_id)
            .cloned()
            .ok_or(IotError::AlarmRuleNotFound { id: alarm_id })?;

        let name = if rule.name.is_empty() {
            rule.rule_id()
        } else {
            rule.name.clone()
        };
        let mut record = AlertRecord::alarm_rule(rule.id, name, rule.level.clone(), payload);
        record.id = self.alerts.insert(&record).await?;
        metrics::counter!("alarm_callbacks_total").increment(1);
        info!(alarm_id, alert_id = record.id, device = ?record.device_id, "告警已记录");

        if !rule.notify.is_effective_at(now)? {
            debug!(alarm_id, "不在通知生效时段内");
            return Ok(record.id);
        }

        for sink in &rule.notify.sinks {
            let Some(notifier) = self.notifiers.get(&sink.kind).cloned() else {
                warn!(alarm_id, kind = %sink.kind, "未配置的通知渠道");
                continue;
            };
            let sink = sink.clone();
            let alert = record.clone();
            self.tasks.spawn(
                format!("notify:{}:{}", sink.kind, alert.id),
                async move { notifier.notify(&sink, &alert).await },
            );
        }
        Ok(record.id)
    }

    pub async fn definition(&self, alarm_id: i64) -> Option<AlarmRule> {
        self.active.read().await.get(&alarm_id).cloned()
    }
}
