//! 外部协作方的抽象接口
//!
//! 业务组件只依赖这些 trait，具体实现位于 `iothub-infrastructure`，
//! 测试替身位于 `iothub-testing-utils`。

pub mod broker;
pub mod catalog;
pub mod rule_engine;
pub mod time_series;

pub use broker::*;
pub use catalog::*;
pub use rule_engine::*;
pub use time_series::*;
