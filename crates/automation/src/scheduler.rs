//! 本地定时场景调度
//!
//! 每个定时场景对应一个后台任务，按CRON表达式计算下一次触发时间后休眠。
//! 任务句柄以场景ID为键保存在读写锁保护的表中，状态查询取读锁，
//! 注册与取消取写锁。

use chrono::{DateTime, Local};
use iothub_core::IotResult;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cron_utils::CronSchedule;

struct ScheduledScene {
    cron: CronSchedule,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct SceneScheduler {
    jobs: RwLock<HashMap<i64, ScheduledScene>>,
}

impl SceneScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册定时场景，已存在的同ID任务会被替换
    pub async fn register<F, Fut>(&self, scene_id: i64, expr: &str, job: F) -> IotResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cron = CronSchedule::parse(expr)?;
        let schedule = cron.clone();
        let handle = tokio::spawn(async move {
            loop {
                let now = Local::now();
                let Some(next) = schedule.next_after(&now) else {
                    warn!(scene_id, expr = schedule.expr(), "CRON表达式没有后续触发时间");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                debug!(scene_id, "定时场景触发");
                job().await;
            }
        });

        let previous = self
            .jobs
            .write()
            .await
            .insert(scene_id, ScheduledScene { cron, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        info!(scene_id, expr, "注册定时场景");
        Ok(())
    }

    /// 取消定时场景，返回是否存在
    pub async fn cancel(&self, scene_id: i64) -> bool {
        match self.jobs.write().await.remove(&scene_id) {
            Some(job) => {
                job.handle.abort();
                info!(scene_id, "取消定时场景");
                true
            }
            None => false,
        }
    }

    pub async fn is_registered(&self, scene_id: i64) -> bool {
        self.jobs.read().await.contains_key(&scene_id)
    }

    /// 下一次触发时间，未注册时为空
    pub async fn next_fire(&self, scene_id: i64) -> Option<DateTime<Local>> {
        self.jobs
            .read()
            .await
            .get(&scene_id)
            .and_then(|job| job.cron.next_after(&Local::now()))
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub async fn cancel_all(&self) {
        let mut jobs = self.jobs.write().await;
        for (_, job) in jobs.drain() {
            job.handle.abort();
        }
    }
}
