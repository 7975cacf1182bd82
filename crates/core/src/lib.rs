pub mod error;
pub mod state;

pub use error::{MaxcpuError, Result};
pub use state::{HelloResponse, Metric, StatsResponse, NOT_READY_MESSAGE};
