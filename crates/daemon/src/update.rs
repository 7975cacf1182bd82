use crate::launch::{confirm_takeover, Relaunch};
use maxcpu_core::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Quiet period after a filesystem event before the binary is looked at, so a
/// deploy still copying the file is not picked up half-written.
const SETTLE: Duration = Duration::from_secs(1);

/// Modification time of `path`.
pub fn modified(path: &Path) -> Result<SystemTime> {
    Ok(std::fs::metadata(path)?.modified()?)
}

/// Hands the socket over to a fresh daemon when the binary is redeployed.
///
/// The binary's mtime is compared with the one captured at startup on every
/// `interval` tick, and shortly after any filesystem event touching it.
#[derive(Debug, Clone)]
pub struct UpdateWatchdog {
    relaunch:  Relaunch,
    started:   SystemTime,
    socket:    PathBuf,
    own_inode: u64,
    interval:  Duration,
    grace:     Duration,
}

impl UpdateWatchdog {
    /// Capture the binary's current mtime as the reference.
    pub fn new(
        relaunch: Relaunch,
        socket: impl Into<PathBuf>,
        own_inode: u64,
        interval: Duration,
        grace: Duration,
    ) -> Result<Self> {
        let started = modified(&relaunch.exe)?;
        Ok(Self {
            relaunch,
            started,
            socket: socket.into(),
            own_inode,
            interval,
            grace,
        })
    }

    /// `true` when the binary on disk differs from the one we started from.
    /// A missing binary (mid-deploy) does not count as changed.
    pub fn binary_changed(&self) -> bool {
        match modified(&self.relaunch.exe) {
            Ok(now) => now != self.started,
            Err(e) => {
                debug!("cannot stat '{}': {e}", self.relaunch.exe.display());
                false
            }
        }
    }

    /// Spawn the replacement and wait until it serves the socket.
    pub async fn handoff(&self) -> Result<()> {
        let mut child = self.relaunch.spawn_supervised()?;
        let confirmed = confirm_takeover(&self.socket, self.own_inode, &mut child, self.grace).await;
        if confirmed.is_err() {
            if let Err(e) = child.kill().await {
                warn!("cannot stop unconfirmed replacement: {e}");
            }
        }
        confirmed
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.watch_loop())
    }

    async fn watch_loop(self) {
        let (fs_tx, mut fs_rx) = mpsc::channel::<notify::Result<notify::Event>>(16);
        let _watcher = watch_binary(&self.relaunch.exe, fs_tx);

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(event) = fs_rx.recv() => {
                    if !self.concerns_binary(event) {
                        continue;
                    }
                    time::sleep(SETTLE).await;
                    while fs_rx.try_recv().is_ok() {}
                }
            }

            if !self.binary_changed() {
                continue;
            }

            info!("Binary '{}' changed on disk; starting replacement", self.relaunch.exe.display());
            match self.handoff().await {
                Ok(()) => {
                    info!("Replacement is serving '{}'; exiting", self.socket.display());
                    // The socket path now belongs to the replacement; leave it alone.
                    std::process::exit(0);
                }
                Err(e) => warn!("Handoff failed, will retry: {e}"),
            }
        }
    }

    fn concerns_binary(&self, event: notify::Result<notify::Event>) -> bool {
        use notify::EventKind::*;
        match event {
            Ok(e) => {
                matches!(e.kind, Modify(_) | Create(_))
                    && e.paths.iter().any(|p| p == &self.relaunch.exe)
            }
            Err(e) => {
                warn!("Watcher error: {e}");
                false
            }
        }
    }
}

/// Watch the directory holding `exe`: deploys usually rename a new file over
/// the old one, which a watch on the file itself would miss.
fn watch_binary(
    exe: &Path,
    tx: mpsc::Sender<notify::Result<notify::Event>>,
) -> Option<notify::RecommendedWatcher> {
    use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};

    let dir = exe.parent()?;
    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = tx.blocking_send(res);
        },
        Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create filesystem watcher: {e}");
            return None;
        }
    };

    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        error!("Failed to watch '{}': {e}", dir.display());
        return None;
    }

    debug!("Watching daemon binary: {}", exe.display());
    Some(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchdog_for(exe: &Path) -> UpdateWatchdog {
        let relaunch = Relaunch {
            exe:  exe.to_path_buf(),
            args: Vec::new(),
        };
        UpdateWatchdog::new(
            relaunch,
            "/nonexistent/m.sock",
            0,
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn unchanged_binary_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("maxcpu");
        std::fs::write(&exe, b"v1").unwrap();

        assert!(!watchdog_for(&exe).binary_changed());
    }

    #[test]
    fn new_mtime_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("maxcpu");
        std::fs::write(&exe, b"v1").unwrap();
        let dog = watchdog_for(&exe);

        let file = std::fs::File::options().write(true).open(&exe).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();

        assert!(dog.binary_changed());
    }

    #[test]
    fn missing_binary_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("maxcpu");
        std::fs::write(&exe, b"v1").unwrap();
        let dog = watchdog_for(&exe);

        std::fs::remove_file(&exe).unwrap();
        assert!(!dog.binary_changed());
    }

    #[tokio::test]
    async fn failed_handoff_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("maxcpu");
        std::fs::write(&exe, b"not a binary").unwrap();

        assert!(watchdog_for(&exe).handoff().await.is_err());
    }
}
