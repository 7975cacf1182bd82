use maxcpu_core::{HelloResponse, MaxcpuError, Result, StatsResponse};
use maxcpu_ipc::{KeyHandler, Router};
use maxcpu_system::Aggregator;

/// Version reported by the `VERSION` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `GET hello`: liveness probe.
#[derive(Debug, Default)]
pub struct HelloHandler;

impl KeyHandler for HelloHandler {
    fn get(&self, _key: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&HelloResponse::ok())?)
    }
}

/// `GET stats`: drains the window and reports its statistics.
#[derive(Debug)]
pub struct StatsHandler {
    aggregator: Aggregator,
}

impl StatsHandler {
    pub fn new(aggregator: Aggregator) -> Self {
        Self { aggregator }
    }
}

impl KeyHandler for StatsHandler {
    fn get(&self, _key: &str) -> Result<Vec<u8>> {
        let response = match self.aggregator.query() {
            Ok(stats) => StatsResponse::with_metrics(stats.metrics()),
            Err(MaxcpuError::NotReady(_)) => StatsResponse::not_ready(),
            Err(e) => return Err(e),
        };
        Ok(serde_json::to_vec(&response)?)
    }
}

/// The daemon's dispatch table: `hello`, `stats`, plus the built-in
/// `VERSION` / `QUIT` commands.
pub fn router(aggregator: Aggregator) -> Router {
    Router::new(VERSION)
        .register("hello", HelloHandler)
        .register("stats", StatsHandler::new(aggregator))
}
