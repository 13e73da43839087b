use bytes::Bytes;
use iothub_core::models::{Job, Topics};
use iothub_core::traits::InboundSink;
use iothub_core::JobPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::classifier::classify;

/// 接入分发器
///
/// 在传输层的事件循环中被同步调用：只做主题分类和非阻塞入队，
/// 队列满时由 [`JobPool::try_submit`] 丢弃并计数。
pub struct IngestDispatcher {
    topics: Topics,
    pool: Arc<JobPool<Job>>,
    unmatched: AtomicU64,
}

impl IngestDispatcher {
    pub fn new(topics: Topics, pool: Arc<JobPool<Job>>) -> Self {
        Self {
            topics,
            pool,
            unmatched: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &Arc<JobPool<Job>> {
        &self.pool
    }

    /// 因队列满被丢弃的消息数
    pub fn dropped(&self) -> u64 {
        self.pool.dropped()
    }

    /// 无法分类的消息数
    pub fn unmatched(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }
}

impl InboundSink for IngestDispatcher {
    fn submit(&self, topic: &str, payload: Bytes) -> bool {
        let Some((kind, gateway_id)) = classify(topic, &self.topics) else {
            self.unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(topic, "忽略无法分类的消息");
            return false;
        };
        self.pool
            .try_submit(Job::new(topic, gateway_id, kind, payload))
    }
}
