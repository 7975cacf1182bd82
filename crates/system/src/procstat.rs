//! Aggregate CPU time counters from `/proc/stat`.

use maxcpu_core::{MaxcpuError, Result};
use std::path::{Path, PathBuf};

/// Kernel clock ticks per second as exposed in `/proc/stat` (`USER_HZ`).
pub const USER_HZ: f64 = 100.0;

/// Cumulative CPU time per category, in seconds.
///
/// Read from `/proc/stat` this is a snapshot since boot; subtracting two
/// snapshots with [`CpuTimes::gap`] gives the time spent in each category
/// during one sampling interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user:       f64,
    pub nice:       f64,
    pub system:     f64,
    pub idle:       f64,
    pub iowait:     f64,
    pub irq:        f64,
    pub softirq:    f64,
    pub steal:      f64,
    pub guest:      f64,
    pub guest_nice: f64,
}

impl CpuTimes {
    /// Per-category difference `self - prev`.
    #[must_use]
    pub fn gap(&self, prev: &CpuTimes) -> CpuTimes {
        CpuTimes {
            user:       self.user - prev.user,
            nice:       self.nice - prev.nice,
            system:     self.system - prev.system,
            idle:       self.idle - prev.idle,
            iowait:     self.iowait - prev.iowait,
            irq:        self.irq - prev.irq,
            softirq:    self.softirq - prev.softirq,
            steal:      self.steal - prev.steal,
            guest:      self.guest - prev.guest,
            guest_nice: self.guest_nice - prev.guest_nice,
        }
    }

    /// user + system + iowait + softirq + steal.
    pub fn busy(&self) -> f64 {
        self.user + self.system + self.iowait + self.softirq + self.steal
    }

    /// Every accounted category.
    pub fn total(&self) -> f64 {
        self.busy() + self.nice + self.idle + self.irq + self.guest + self.guest_nice
    }

    fn fields(&self) -> [f64; 10] {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ]
    }

    /// Busy percentage of a gap, or `None` when it cannot be a valid sample:
    /// nothing was accounted (`total == 0`) or a counter went backwards.
    pub fn usage(&self) -> Option<f64> {
        if self.fields().iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        Some(100.0 * self.busy() / total)
    }
}

/// Anything that can produce a fresh [`CpuTimes`] snapshot.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Result<CpuTimes>;
}

/// Reads the aggregate `cpu ` line from a procfs `stat` file.
#[derive(Debug, Clone)]
pub struct ProcStat {
    path: PathBuf,
}

impl ProcStat {
    pub fn new() -> Self {
        Self::at("/proc/stat")
    }

    /// Read from a different file, e.g. inside a chroot.
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for ProcStat {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for ProcStat {
    fn snapshot(&self) -> Result<CpuTimes> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| MaxcpuError::System(format!("cannot read '{}': {e}", self.path.display())))?;
        parse_stat(&raw)
    }
}

/// Parse the first `cpu ` line of `/proc/stat` content.
///
/// ```text
/// cpu  168487 7399 36999 7766545 3915 0 13480 0 0 0
///      user   nice system idle   iowait irq softirq steal guest guest_nice
/// ```
///
/// Older kernels report fewer columns; missing ones stay at zero.
pub fn parse_stat(content: &str) -> Result<CpuTimes> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| MaxcpuError::System("no cpu stats found in /proc/stat".into()))?;

    let mut values = [0.0_f64; 10];
    for (slot, field) in values.iter_mut().zip(line.split_whitespace().skip(1)) {
        *slot = parse_ticks(field)?;
    }

    let [user, nice, system, idle, iowait, irq, softirq, steal, guest, guest_nice] = values;
    Ok(CpuTimes {
        user,
        nice,
        system,
        idle,
        iowait,
        irq,
        softirq,
        steal,
        guest,
        guest_nice,
    })
}

fn parse_ticks(field: &str) -> Result<f64> {
    let ticks = field
        .parse::<u64>()
        .map_err(|e| MaxcpuError::System(format!("bad cpu counter '{field}': {e}")))?;
    Ok(ticks as f64 / USER_HZ)
}
