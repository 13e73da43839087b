pub mod config;
pub mod errors;
pub mod job_pool;
pub mod models;
pub mod task_pool;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use job_pool::{JobHandler, JobPool};
pub use task_pool::TaskPool;
