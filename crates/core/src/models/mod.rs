//! # 数据模型
//!
//! 网关上下行报文、接入任务以及时序写入相关的核心数据结构。
//!
//! - [`envelope`]: 与网关、规则引擎交互的 JSON 报文
//! - [`job`]: 接入分发器产生的一次性任务
//! - [`telemetry`]: 遥测点与时序表结构描述
//! - [`rule`]: 提交给远端规则引擎的规则定义
//! - [`topics`]: 上下行主题布局

pub mod envelope;
pub mod job;
pub mod rule;
pub mod telemetry;
pub mod topics;

pub use envelope::*;
pub use job::*;
pub use rule::*;
pub use telemetry::*;
pub use topics::Topics;
