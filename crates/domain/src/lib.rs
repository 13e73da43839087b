pub mod entities;
pub mod ports;
pub mod repositories;
pub mod rule_dsl;
pub mod rule_query;

pub use entities::*;
pub use iothub_core::{IotError, IotResult};
pub use ports::*;
pub use repositories::*;
pub use rule_dsl::*;
pub use rule_query::*;
