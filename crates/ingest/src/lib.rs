//! 设备数据接入：主题分类、工作池分发、时序批量写入与在线状态维护

pub mod classifier;
pub mod dispatcher;
pub mod event_recorder;
pub mod forwarder;
pub mod handler;
pub mod offline_sweeper;
pub mod schema_registry;
pub mod status_cache;
pub mod status_tracker;
pub mod writer;

pub use classifier::classify;
pub use dispatcher::IngestDispatcher;
pub use event_recorder::EventRecorder;
pub use forwarder::{ForwardJob, StreamForwarder};
pub use handler::IngestHandler;
pub use offline_sweeper::OfflineSweeper;
pub use schema_registry::SchemaRegistry;
pub use status_cache::{DeviceStatusCache, PutOutcome};
pub use status_tracker::DeviceStatusTracker;
pub use writer::TelemetryWriter;
