use maxcpu_system::CpuMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::info;

/// Exits the process once nobody has queried stats for `max_idle_secs`.
#[derive(Debug, Clone)]
pub struct IdleWatchdog {
    monitor:       Arc<CpuMonitor>,
    max_idle_secs: u64,
}

impl IdleWatchdog {
    pub fn new(monitor: Arc<CpuMonitor>, max_idle_secs: u64) -> Self {
        Self {
            monitor,
            max_idle_secs,
        }
    }

    /// Count one more idle second; `true` once the limit is exceeded.
    pub fn check(&self) -> bool {
        self.monitor.idle().tick() > self.max_idle_secs
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_secs(1));
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if self.check() {
                    info!(
                        "No stats query for {}s; exiting",
                        self.monitor.idle().seconds()
                    );
                    // The socket file stays: a replacement may already own the path.
                    std::process::exit(0);
                }
            }
        })
    }
}
