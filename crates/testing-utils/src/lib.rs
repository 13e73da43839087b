//! # IoTHub Testing Utils
//!
//! 工作区共享的测试工具：所有协作方 trait 的内存实现、测试数据构造器以及
//! 异步等待辅助函数。只作为 dev-dependency 引入：
//!
//! ```toml
//! [dev-dependencies]
//! iothub-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
