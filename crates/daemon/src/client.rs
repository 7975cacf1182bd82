//! Client side of a monitoring run: probe the daemon, fetch stats, or start
//! the daemon when nobody answers.

use crate::launch::Relaunch;
use maxcpu_config::ClientConfig;
use maxcpu_core::{HelloResponse, MaxcpuError, Metric, Result, StatsResponse};
use maxcpu_ipc::Client;
use maxcpu_system::SnapshotSource;
use std::path::Path;
use tracing::{info, warn};

/// Prefix of every metric line printed for the monitoring agent.
pub const METRIC_PREFIX: &str = "maxcpu.us_sy_wa_si_st_usage";

/// What a client invocation ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The daemon answered with a full set of metrics.
    Stats(Vec<Metric>),
    /// No daemon was reachable; one was started in the background.
    Spawned,
}

/// `GET hello`, decoded.
pub async fn hello(client: &mut Client) -> Result<HelloResponse> {
    let raw = client.get("hello").await?;
    let res: HelloResponse = serde_json::from_slice(&raw)?;
    if res.message != "OK" {
        return Err(MaxcpuError::Ipc(format!("unexpected hello: {}", res.message)));
    }
    Ok(res)
}

/// `GET stats`, decoded. A window that is still filling up is
/// [`MaxcpuError::NotReady`].
pub async fn stats(client: &mut Client) -> Result<Vec<Metric>> {
    let raw = client.get("stats").await?;
    let res: StatsResponse = serde_json::from_slice(&raw)?;
    if !res.error.is_empty() {
        return Err(MaxcpuError::NotReady(res.error));
    }
    if res.metrics.is_empty() {
        return Err(MaxcpuError::Ipc("could not fetch any metrics".into()));
    }
    Ok(res.metrics)
}

/// Probe the daemon at `socket` and query it; start it if unreachable.
///
/// The spawn path does not retry: the next invocation is expected to find
/// the daemon running.
pub async fn run(
    socket: &Path,
    config: &ClientConfig,
    source: &dyn SnapshotSource,
    relaunch: &Relaunch,
) -> Result<Outcome> {
    let mut client = Client::new(socket, config.probe_timeout());

    if let Err(e) = hello(&mut client).await {
        warn!("Daemon not reachable: {e}");

        // No point in starting a daemon that cannot sample.
        source.snapshot()?;

        let pid = relaunch.spawn_detached()?;
        info!("Started background process (pid {pid})");
        return Ok(Outcome::Spawned);
    }

    client.set_timeout(config.query_timeout());
    stats(&mut client).await.map(Outcome::Stats)
}

/// One output line: `<prefix>.<key>\t<value>\t<epoch>`.
pub fn format_metric(metric: &Metric) -> String {
    format!(
        "{METRIC_PREFIX}.{}\t{:.6}\t{}",
        metric.key, metric.metric, metric.epoch
    )
}
