#![allow(dead_code)]

use iothub_automation::{
    active_definitions, AlarmRuleService, RuleContext, RuleDeployer, SceneScheduler, SceneService,
};
use iothub_control::CommandCorrelator;
use iothub_core::config::CommandConfig;
use iothub_core::models::Topics;
use iothub_core::traits::RuleEngineClient;
use iothub_core::TaskPool;
use iothub_domain::{Notifier, StreamNames};
use iothub_testing_utils::{
    MockAlertRepository, MockDeviceCatalog, MockMessageBroker, MockRuleEngineClient,
    MockWriteLogRepository, RecordingNotifier,
};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub scenes: Arc<SceneService>,
    pub alarms: Arc<AlarmRuleService>,
    pub scheduler: Arc<SceneScheduler>,
    pub tasks: Arc<TaskPool>,
    pub engine: MockRuleEngineClient,
    pub broker: MockMessageBroker,
    pub write_logs: MockWriteLogRepository,
    pub alerts: MockAlertRepository,
    pub webhook: RecordingNotifier,
}

pub fn harness() -> Harness {
    let engine = MockRuleEngineClient::new();
    harness_with_engine(Arc::new(engine.clone()), engine)
}

/// `client` 为服务实际使用的规则引擎，`engine` 仅用于断言
pub fn harness_with_engine(client: Arc<dyn RuleEngineClient>, engine: MockRuleEngineClient) -> Harness {
    let catalog = MockDeviceCatalog::new()
        .with_device("lamp", "light", Some("gw1"))
        .with_device("fan", "hvac", Some("gw2"));
    let broker = MockMessageBroker::new();
    let write_logs = MockWriteLogRepository::new();
    let alerts = MockAlertRepository::new();
    let webhook = RecordingNotifier::new("webhook");

    let correlator = Arc::new(CommandCorrelator::new(
        Arc::new(catalog),
        Arc::new(write_logs.clone()),
        Arc::new(broker.clone()),
        Topics::new("iot/gateway", "iot/stream"),
        &CommandConfig::default(),
    ));
    let deployer = Arc::new(RuleDeployer::new(client, Duration::from_secs(1)));
    let tasks = Arc::new(TaskPool::new("automation", Duration::from_secs(2)));
    let scheduler = Arc::new(SceneScheduler::new());
    let context = RuleContext::new(StreamNames::default(), "http://hub:8080");

    let scenes = Arc::new(SceneService::new(
        scheduler.clone(),
        deployer.clone(),
        correlator,
        tasks.clone(),
        context.clone(),
        active_definitions(),
    ));
    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(webhook.clone())];
    let alarms = Arc::new(AlarmRuleService::new(
        deployer,
        Arc::new(alerts.clone()),
        notifiers,
        tasks.clone(),
        context,
        active_definitions(),
    ));

    Harness {
        scenes,
        alarms,
        scheduler,
        tasks,
        engine,
        broker,
        write_logs,
        alerts,
        webhook,
    }
}
