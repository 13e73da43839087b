pub mod database;
pub mod mqtt;
pub mod notifier;
pub mod rule_engine;
pub mod timeout_handler;
pub mod tsdb;

pub use database::*;
pub use mqtt::*;
pub use notifier::*;
pub use rule_engine::*;
pub use timeout_handler::*;
pub use tsdb::*;
