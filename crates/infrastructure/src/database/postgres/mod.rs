pub mod postgres_alert_repository;
pub mod postgres_device_catalog;
pub mod postgres_write_log_repository;

pub use postgres_alert_repository::*;
pub use postgres_device_catalog::*;
pub use postgres_write_log_repository::*;
