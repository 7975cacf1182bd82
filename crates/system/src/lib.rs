//! CPU sampling engine: `/proc/stat` snapshots, the usage ring and the
//! statistics drained from it.

pub mod aggregator;
pub mod cpu;
pub mod monitor;
pub mod procstat;
pub mod sampler;

pub use aggregator::{nearest_rank, summarize, Aggregator, Stats};
pub use cpu::{History, Recorded, UsageRecord, DEFAULT_HISTORY_SIZE};
pub use monitor::{CpuMonitor, IdleClock};
pub use procstat::{parse_stat, CpuTimes, ProcStat, SnapshotSource};
pub use sampler::Sampler;
