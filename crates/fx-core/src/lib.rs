pub mod error;
pub mod routing;
pub mod scheduler;
pub mod traits;
pub mod types;

pub use error::*;
pub use routing::{ModelRoutingTable, RoutingDecision, RoutingState};
pub use scheduler::{Scheduler, WorkerPool};
pub use traits::*;
pub use types::*;
