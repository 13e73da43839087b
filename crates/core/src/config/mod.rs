//! 平台配置
//!
//! 配置由默认值、TOML 文件和 `IOTHUB` 前缀的环境变量依次叠加而成，
//! 加载后统一经过各分段的 `validate()` 校验。

pub mod models;

pub use models::*;

#[cfg(test)]
mod tests;
