use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use iothub_automation::{
    active_definitions, create_callback_routes, AlarmRuleService, CallbackState, RuleContext,
    RuleDeployer, SceneScheduler, SceneService,
};
use iothub_control::CommandCorrelator;
use iothub_core::models::{EventReport, Job, Topics};
use iothub_core::traits::{AckSink, DeviceCatalog, InboundSink, MessageBroker, RuleEngineClient, TimeSeriesStore};
use iothub_core::{AppConfig, JobPool, TaskPool};
use iothub_domain::{AlertRepository, Notifier, WriteLogRepository};
use iothub_infrastructure::{
    mqtt, DatabaseManager, EkuiperClient, LoggingNotifier, MqttIngress, PostgresAlertRepository,
    PostgresDeviceCatalog, PostgresWriteLogRepository, TdengineRestStore, WebhookNotifier,
};
use iothub_ingest::{
    DeviceStatusCache, DeviceStatusTracker, EventRecorder, ForwardJob, IngestDispatcher,
    IngestHandler, OfflineSweeper, SchemaRegistry, StreamForwarder, TelemetryWriter,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// 组合根：持有全部已装配的组件，`run` 启动后台循环直到收到关闭信号
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    writer: Arc<TelemetryWriter>,
    sweeper: Arc<OfflineSweeper>,
    correlator: Arc<CommandCorrelator>,
    ingest_pool: Arc<JobPool<Job>>,
    handler: Arc<IngestHandler>,
    forward_pool: Arc<JobPool<ForwardJob>>,
    forwarder: Arc<StreamForwarder>,
    event_pool: Arc<JobPool<EventReport>>,
    recorder: Arc<EventRecorder>,
    dispatcher: Arc<IngestDispatcher>,
    ingress: MqttIngress,
    scheduler: Arc<SceneScheduler>,
    tasks: Arc<TaskPool>,
    scenes: Arc<SceneService>,
    alarms: Arc<AlarmRuleService>,
}

impl Application {
    /// 连接外部依赖并装配组件，此时还不接收任何消息
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        info!("连接数据库: {}", mask_database_url(&config.database.url));
        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        sqlx::migrate!("./migrations")
            .run(database.pool())
            .await
            .context("运行数据库迁移失败")?;
        info!("数据库连接成功");

        let pool = database.pool().clone();
        let catalog: Arc<dyn DeviceCatalog> = Arc::new(PostgresDeviceCatalog::new(pool.clone()));
        let write_logs: Arc<dyn WriteLogRepository> =
            Arc::new(PostgresWriteLogRepository::new(pool.clone()));
        let alerts: Arc<dyn AlertRepository> = Arc::new(PostgresAlertRepository::new(pool));

        let store: Arc<dyn TimeSeriesStore> =
            Arc::new(TdengineRestStore::new(&config.tsdb).context("创建时序库客户端失败")?);
        let engine: Arc<dyn RuleEngineClient> =
            Arc::new(EkuiperClient::new(&config.rule_engine).context("创建规则引擎客户端失败")?);

        let hostname = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "iothub".to_string());
        let (broker, ingress) = mqtt::connect(&config.mqtt, &hostname);
        let broker: Arc<dyn MessageBroker> = Arc::new(broker);
        let topics = Topics::from_config(&config.mqtt);

        let registry = Arc::new(SchemaRegistry::new(
            Arc::clone(&catalog),
            Arc::clone(&store),
            config.tsdb.default_text_length,
        ));
        let devices = registry.load().await.context("加载设备映射失败")?;
        info!("已加载 {} 台设备的子表映射", devices);

        let writer = Arc::new(TelemetryWriter::new(registry, store, &config.writer));
        let cache = Arc::new(DeviceStatusCache::from_config(&config.status_cache));
        let tracker = Arc::new(DeviceStatusTracker::new(Arc::clone(&cache), Arc::clone(&catalog)));
        let sweeper = Arc::new(OfflineSweeper::new(
            Arc::clone(&catalog),
            cache,
            &config.status_cache,
        ));

        let correlator = Arc::new(CommandCorrelator::new(
            Arc::clone(&catalog),
            write_logs,
            Arc::clone(&broker),
            topics.clone(),
            &config.command,
        ));

        let ingest = &config.ingest;
        let ingest_pool = Arc::new(JobPool::new("ingest", ingest.queue_capacity, ingest.workers));
        let forward_pool = Arc::new(JobPool::new(
            "forward",
            ingest.forward_queue_capacity,
            ingest.forward_workers,
        ));
        let event_pool = Arc::new(JobPool::new(
            "event",
            ingest.event_queue_capacity,
            ingest.event_workers,
        ));

        let handler = Arc::new(IngestHandler::new(
            topics.clone(),
            Arc::clone(&writer),
            tracker,
            Arc::clone(&forward_pool),
            Arc::clone(&event_pool),
            Arc::clone(&correlator) as Arc<dyn AckSink>,
        ));
        let forwarder = Arc::new(StreamForwarder::new(broker));
        let recorder = Arc::new(EventRecorder::new(Arc::clone(&alerts)));
        let dispatcher = Arc::new(IngestDispatcher::new(topics, Arc::clone(&ingest_pool)));

        let scheduler = Arc::new(SceneScheduler::default());
        let deployer = Arc::new(RuleDeployer::new(
            engine,
            Duration::from_secs(config.rule_engine.stop_timeout_seconds),
        ));
        let tasks = Arc::new(TaskPool::new(
            "automation",
            Duration::from_secs(config.rule_engine.request_timeout_seconds.max(1) * 2),
        ));
        let context = RuleContext::from_config(&config.rule_engine);

        let scenes = Arc::new(SceneService::new(
            Arc::clone(&scheduler),
            Arc::clone(&deployer),
            Arc::clone(&correlator),
            Arc::clone(&tasks),
            context.clone(),
            active_definitions(),
        ));

        let notifiers: Vec<Arc<dyn Notifier>> = vec![
            Arc::new(WebhookNotifier::new(NOTIFY_TIMEOUT).context("创建webhook通知客户端失败")?),
            Arc::new(LoggingNotifier),
        ];
        let alarms = Arc::new(AlarmRuleService::new(
            deployer,
            alerts,
            notifiers,
            Arc::clone(&tasks),
            context,
            active_definitions(),
        ));

        Ok(Self {
            config,
            database,
            writer,
            sweeper,
            correlator,
            ingest_pool,
            handler,
            forward_pool,
            forwarder,
            event_pool,
            recorder,
            dispatcher,
            ingress,
            scheduler,
            tasks,
            scenes,
            alarms,
        })
    }

    /// 场景服务，供外部的场景管理调用启停
    pub fn scenes(&self) -> Arc<SceneService> {
        Arc::clone(&self.scenes)
    }

    /// 告警规则服务
    pub fn alarms(&self) -> Arc<AlarmRuleService> {
        Arc::clone(&self.alarms)
    }

    /// 指令关联器，供外部的设备控制入口下发指令
    pub fn correlator(&self) -> Arc<CommandCorrelator> {
        Arc::clone(&self.correlator)
    }

    /// 运行应用程序
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序");

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        // 先启动消费端，再开始接收 MQTT 消息
        handles.extend(
            self.event_pool
                .spawn_workers(Arc::clone(&self.recorder), shutdown_rx.resubscribe()),
        );
        handles.extend(
            self.forward_pool
                .spawn_workers(Arc::clone(&self.forwarder), shutdown_rx.resubscribe()),
        );
        handles.extend(
            self.ingest_pool
                .spawn_workers(Arc::clone(&self.handler), shutdown_rx.resubscribe()),
        );

        handles.push(tokio::spawn(
            Arc::clone(&self.writer).run(shutdown_rx.resubscribe()),
        ));
        handles.push(tokio::spawn(
            Arc::clone(&self.sweeper).run(shutdown_rx.resubscribe()),
        ));
        handles.push(tokio::spawn(
            Arc::clone(&self.correlator).run_expiry(shutdown_rx.resubscribe()),
        ));

        if self.config.api.enabled {
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
            info!("规则回调监听启动在 http://{}", self.config.api.bind_address);

            let app = create_callback_routes(CallbackState {
                scenes: Arc::clone(&self.scenes),
                alarms: Arc::clone(&self.alarms),
            })
            .layer(TraceLayer::new_for_http());
            let mut server_shutdown = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                let server = axum::serve(listener, app.into_make_service())
                    .with_graceful_shutdown(async move {
                        let _ = server_shutdown.recv().await;
                    });
                if let Err(e) = server.await {
                    error!("规则回调监听运行失败: {}", e);
                }
            }));
        } else {
            warn!("规则回调监听已禁用，场景与告警规则的远端触发将无法送达");
        }

        let sink: Arc<dyn InboundSink> = Arc::clone(&self.dispatcher) as Arc<dyn InboundSink>;
        handles.push(tokio::spawn(
            self.ingress.run(sink, shutdown_rx.resubscribe()),
        ));

        let _ = shutdown_rx.recv().await;
        info!("应用程序收到关闭信号");

        self.scheduler.cancel_all().await;
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("后台任务退出异常: {}", e);
            }
        }
        self.tasks.drain().await;

        info!(
            ingest_dropped = self.ingest_pool.dropped(),
            forward_dropped = self.forward_pool.dropped(),
            event_dropped = self.event_pool.dropped(),
            "工作池已停止"
        );

        self.database.close().await;
        info!("所有组件已停止");
        Ok(())
    }
}

/// 屏蔽数据库URL中的敏感信息
fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_database_url() {
        assert_eq!(
            mask_database_url("postgresql://iot:secret@db:5432/iothub"),
            "postgresql://iot:***@db:5432/iothub"
        );
        assert_eq!(
            mask_database_url("postgresql://localhost/iothub"),
            "postgresql://localhost/iothub"
        );
    }
}
