pub mod alarm;
pub mod api;
pub mod cron_utils;
pub mod deployer;
pub mod scene;
pub mod scheduler;

pub use alarm::AlarmRuleService;
pub use api::{create_callback_routes, CallbackState};
pub use cron_utils::CronSchedule;
pub use deployer::{RuleContext, RuleDeployer};
pub use scene::{SceneService, SceneStatus};
pub use scheduler::SceneScheduler;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 已启动的场景/告警定义，以ID为键，供回调时查找
pub type ActiveDefinitions<T> = Arc<RwLock<HashMap<i64, T>>>;

pub fn active_definitions<T>() -> ActiveDefinitions<T> {
    Arc::new(RwLock::new(HashMap::new()))
}
