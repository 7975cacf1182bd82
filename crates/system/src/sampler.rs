use crate::cpu::Recorded;
use crate::monitor::CpuMonitor;
use crate::procstat::SnapshotSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

/// Feeds the shared [`CpuMonitor`] from a [`SnapshotSource`].
pub struct Sampler<S> {
    source:  S,
    monitor: Arc<CpuMonitor>,
}

impl<S: SnapshotSource + 'static> Sampler<S> {
    pub fn new(source: S, monitor: Arc<CpuMonitor>) -> Self {
        Self { source, monitor }
    }

    /// Take one snapshot and record it.
    ///
    /// A failed read is logged and leaves the ring untouched; the next tick
    /// simply tries again.
    pub fn tick(&self) -> Option<Recorded> {
        match self.source.snapshot() {
            Ok(snapshot) => {
                let recorded = self.monitor.record(snapshot);
                if let Recorded::Sample { slot, usage: None } = recorded {
                    debug!("CPU sample in slot {slot} has no usable gap; skipped");
                }
                Some(recorded)
            }
            Err(e) => {
                warn!("Skipping CPU sample: {e}");
                None
            }
        }
    }

    /// Spawn a background Tokio task that calls [`Sampler::tick`] every
    /// `interval`. The first tick fires immediately and seeds the baseline.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.tick();
            }
        })
    }
}
