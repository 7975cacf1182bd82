//! The `maxcpu` daemon: wires the sampler, the watchdogs and the socket
//! endpoint together. Also hosts the client-side flow of a monitoring run.

pub mod client;
pub mod handlers;
pub mod idle;
pub mod launch;
pub mod update;

pub use client::{format_metric, Outcome};
pub use launch::Relaunch;

use maxcpu_config::DaemonConfig;
use maxcpu_core::{MaxcpuError, Result};
use maxcpu_ipc::Server;
use maxcpu_system::{Aggregator, CpuMonitor, ProcStat, Sampler, SnapshotSource};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::time;
use tracing::{info, warn};

use idle::IdleWatchdog;
use update::UpdateWatchdog;

/// Everything a daemon process needs to start.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub socket:   PathBuf,
    pub config:   DaemonConfig,
    /// How to start a replacement of this very process.
    pub relaunch: Relaunch,
}

/// Run the daemon on `/proc/stat` until SIGTERM / SIGINT.
pub async fn run(opts: DaemonOptions) -> Result<()> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(shutdown_on_signal(tx));
    run_with(opts, ProcStat::new(), rx).await
}

/// Run the daemon with an explicit snapshot source until `shutdown` fires.
pub async fn run_with<S>(opts: DaemonOptions, source: S, shutdown: watch::Receiver<bool>) -> Result<()>
where
    S: SnapshotSource + 'static,
{
    let config = &opts.config;
    maxcpu_config::validate(config)?;

    let monitor = Arc::new(CpuMonitor::new(config.sampler.history_size));
    let sampler = Sampler::new(source, monitor.clone()).spawn(config.sampler.interval());
    let idle = IdleWatchdog::new(monitor.clone(), config.supervisor.max_idle_secs).spawn();

    // Let the first tick lay down a baseline before anyone can query.
    time::sleep(config.sampler.interval()).await;

    let listener = bind(&opts.socket)?;
    let own_inode = launch::socket_inode(&opts.socket)?;
    info!("Listening on {}", opts.socket.display());

    let update = UpdateWatchdog::new(
        opts.relaunch.clone(),
        &opts.socket,
        own_inode,
        config.supervisor.update_check(),
        config.supervisor.handoff_grace(),
    )?
    .spawn();

    let server = Server::new(
        handlers::router(Aggregator::new(monitor)),
        config.server.conn_idle_timeout(),
    );
    let served = server.serve(listener, shutdown).await;

    sampler.abort();
    idle.abort();
    update.abort();
    served
}

/// Replace whatever is at `path` with a freshly bound listener.
fn bind(path: &Path) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("cannot remove stale socket '{}': {e}", path.display()),
    }
    UnixListener::bind(path)
        .map_err(|e| MaxcpuError::Ipc(format!("bind '{}': {e}", path.display())))
}

async fn shutdown_on_signal(tx: watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = terminate => info!("SIGTERM received"),
        _ = interrupt => info!("SIGINT received"),
    }
    let _ = tx.send(true);
}
