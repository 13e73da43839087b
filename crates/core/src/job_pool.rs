//! 有界任务队列与固定大小的工作协程池
//!
//! 提交永不阻塞：队列满时直接丢弃任务并计数。处理函数中的 panic
//! 只会终止当前任务，工作协程继续消费后续任务。

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::IotResult;

/// 任务处理器
#[async_trait]
pub trait JobHandler<J>: Send + Sync {
    async fn handle(&self, job: J) -> IotResult<()>;
}

pub struct JobPool<J> {
    name: &'static str,
    sender: mpsc::Sender<J>,
    receiver: Arc<Mutex<mpsc::Receiver<J>>>,
    workers: usize,
    dropped: AtomicU64,
    panics: Arc<AtomicU64>,
}

impl<J: Send + 'static> JobPool<J> {
    pub fn new(name: &'static str, capacity: usize, workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            name,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            workers: workers.max(1),
            dropped: AtomicU64::new(0),
            panics: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 非阻塞提交，队列已满或已关闭时丢弃并返回 `false`
    pub fn try_submit(&self, job: J) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!("ingest_jobs_dropped_total", "queue" => self.name).increment(1);
                warn!(queue = self.name, dropped_total = total, "任务队列已满，丢弃任务");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(queue = self.name, "任务队列已关闭，丢弃任务");
                false
            }
        }
    }

    /// 因队列满或关闭而丢弃的任务数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 处理过程中 panic 的任务数
    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// 队列中等待处理的任务数
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// 启动固定数量的工作协程，收到关闭信号后退出
    pub fn spawn_workers<H>(
        &self,
        handler: Arc<H>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Vec<JoinHandle<()>>
    where
        H: JobHandler<J> + ?Sized + 'static,
    {
        (0..self.workers)
            .map(|worker_index| {
                let receiver = Arc::clone(&self.receiver);
                let handler = Arc::clone(&handler);
                let panics = Arc::clone(&self.panics);
                let mut shutdown_rx = shutdown_rx.resubscribe();
                let name = self.name;

                tokio::spawn(async move {
                    debug!(queue = name, worker = worker_index, "工作协程启动");
                    loop {
                        let job = {
                            let mut rx = receiver.lock().await;
                            tokio::select! {
                                _ = shutdown_rx.recv() => None,
                                job = rx.recv() => job,
                            }
                        };
                        let Some(job) = job else {
                            break;
                        };

                        match AssertUnwindSafe(handler.handle(job)).catch_unwind().await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                warn!(queue = name, worker = worker_index, error = %e, "任务处理失败");
                            }
                            Err(panic) => {
                                panics.fetch_add(1, Ordering::Relaxed);
                                metrics::counter!("ingest_handler_panics_total", "queue" => name)
                                    .increment(1);
                                error!(
                                    queue = name,
                                    worker = worker_index,
                                    panic = %panic_message(&*panic),
                                    "任务处理发生panic，已隔离"
                                );
                            }
                        }
                    }
                    debug!(queue = name, worker = worker_index, "工作协程退出");
                })
            })
            .collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
