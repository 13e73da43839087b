//! 受监管的后台任务
//!
//! 用于发送通知、停止远端规则等"发出即忘"的副作用：每个任务有独立超时，
//! 失败只记录日志，调用方的请求路径不依赖其完成。测试可通过 [`TaskPool::drain`]
//! 同步等待所有任务结束。

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::IotResult;

pub struct TaskPool {
    name: &'static str,
    timeout: Duration,
    tasks: Mutex<JoinSet<()>>,
}

impl TaskPool {
    pub fn new(name: &'static str, timeout: Duration) -> Self {
        Self {
            name,
            timeout,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// 提交一个后台任务，超时或失败只记录警告
    pub fn spawn<F>(&self, label: impl Into<String>, fut: F)
    where
        F: Future<Output = IotResult<()>> + Send + 'static,
    {
        let label = label.into();
        let pool = self.name;
        let timeout = self.timeout;
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        // 顺带回收已结束的任务
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(())) => debug!(pool, task = %label, "后台任务完成"),
                Ok(Err(e)) => warn!(pool, task = %label, error = %e, "后台任务失败"),
                Err(_) => warn!(pool, task = %label, timeout_ms = timeout.as_millis() as u64, "后台任务超时"),
            }
        });
    }

    /// 尚未回收的任务数
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 等待当前已提交的全部任务结束
    pub async fn drain(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(pool = self.name, error = %e, "后台任务异常退出");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IotError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_waits_for_all_tasks() {
        let pool = TaskPool::new("test", Duration::from_secs(1));
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let counter = Arc::clone(&counter);
            pool.spawn(format!("task-{i}"), async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        pool.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_do_not_propagate() {
        let pool = TaskPool::new("test", Duration::from_millis(20));
        pool.spawn("fails", async { Err(IotError::Internal("boom".into())) });
        pool.spawn("hangs", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });

        tokio::time::timeout(Duration::from_secs(1), pool.drain())
            .await
            .unwrap();
    }
}
