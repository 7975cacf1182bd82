//! maxcpu — max / min / avg / percentile CPU usage for a monitoring agent,
//! computed by a background daemon that the first invocation starts.
//!
//! Run with:  `maxcpu --socket /tmp/maxcpu.sock`

use anyhow::{Context, Result};
use clap::Parser;
use maxcpu_config::DaemonConfig;
use maxcpu_daemon::{client, format_metric, DaemonOptions, Outcome, Relaunch};
use maxcpu_system::ProcStat;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "maxcpu", disable_version_flag = true)]
struct Args {
    /// Socket file used by the calculating daemon
    #[arg(short, long, required_unless_present = "version")]
    socket: Option<PathBuf>,

    /// Run as the daemon instead of querying it
    #[arg(long)]
    as_daemon: bool,

    /// Daemon configuration file (default: $XDG_CONFIG_HOME/maxcpu/maxcpu.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show version
    #[arg(short = 'v', long)]
    version: bool,
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the metric lines.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if args.version {
        println!(
            "maxcpu {}\nTarget: {} {}",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let socket = args.socket.clone().context("--socket is required")?;
    let config_path = args.config.clone().unwrap_or_else(maxcpu_config::default_path);
    let config = maxcpu_config::load(&config_path)
        .with_context(|| format!("loading '{}'", config_path.display()))?;

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    if args.as_daemon {
        tracing::info!("maxcpu v{} starting daemon", env!("CARGO_PKG_VERSION"));
        runtime.block_on(run_daemon(socket, config))
    } else {
        runtime.block_on(run_client(socket, config, args.config))
    }
}

async fn run_daemon(socket: PathBuf, config: DaemonConfig) -> Result<()> {
    let relaunch = Relaunch::current()?;
    maxcpu_daemon::run(DaemonOptions {
        socket,
        config,
        relaunch,
    })
    .await?;
    Ok(())
}

async fn run_client(socket: PathBuf, config: DaemonConfig, config_arg: Option<PathBuf>) -> Result<()> {
    let exe = std::env::current_exe().context("cannot locate own binary")?;
    let relaunch = Relaunch::daemon(exe, &socket, config_arg.as_deref());

    match client::run(&socket, &config.client, &ProcStat::new(), &relaunch).await? {
        Outcome::Stats(metrics) => {
            for metric in &metrics {
                println!("{}", format_metric(metric));
            }
        }
        Outcome::Spawned => {}
    }
    Ok(())
}
