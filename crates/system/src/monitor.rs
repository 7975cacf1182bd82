use crate::cpu::{History, Recorded};
use crate::procstat::CpuTimes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Seconds since the last stats query.
///
/// Lock-free on purpose: the idle watchdog and the query path touch it
/// without taking the history lock.
#[derive(Debug, Default)]
pub struct IdleClock(AtomicU64);

impl IdleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one second and return the new value.
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    pub fn seconds(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// State shared by the sampler, the aggregator and the idle watchdog.
#[derive(Debug)]
pub struct CpuMonitor {
    history: Mutex<History>,
    idle:    IdleClock,
}

impl CpuMonitor {
    pub fn new(history_size: usize) -> Self {
        Self {
            history: Mutex::new(History::new(history_size)),
            idle:    IdleClock::new(),
        }
    }

    pub fn idle(&self) -> &IdleClock {
        &self.idle
    }

    /// Append a snapshot under the history lock.
    pub fn record(&self, snapshot: CpuTimes) -> Recorded {
        self.lock().record(snapshot)
    }

    /// Take every usage of the current window and start a new one.
    pub fn drain(&self) -> Vec<f64> {
        self.lock().drain()
    }

    /// Copy of the ring as it is right now.
    pub fn history(&self) -> History {
        self.lock().clone()
    }

    // Every critical section leaves the ring consistent, so a panic elsewhere
    // while holding the lock doesn't invalidate it.
    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
