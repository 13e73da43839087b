//! 外部调用的超时控制

use iothub_core::{IotError, IotResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::error;

/// 在给定时限内执行外部调用，超时转换为 `IotError::Timeout`
pub async fn with_timeout<F, T>(duration: Duration, component: &str, operation: &str, fut: F) -> IotResult<T>
where
    F: Future<Output = IotResult<T>>,
{
    match timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                component,
                operation,
                timeout_ms = duration.as_millis() as u64,
                "{}操作超时: {}",
                component,
                operation
            );
            Err(IotError::timeout(format!(
                "{component}操作超时: {operation} ({}ms)",
                duration.as_millis()
            )))
        }
    }
}
