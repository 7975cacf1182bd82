use crate::monitor::CpuMonitor;
use maxcpu_core::{MaxcpuError, Metric, Result, NOT_READY_MESSAGE};
use std::sync::Arc;

/// Order statistics over one drained window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub max:     f64,
    pub min:     f64,
    pub avg:     f64,
    pub p90:     f64,
    pub p75:     f64,
    /// Query time, seconds since the Unix epoch.
    pub epoch:   i64,
    pub samples: usize,
}

impl Stats {
    /// The five metrics in wire order: `max`, `min`, `avg`, `90pt`, `75pt`.
    pub fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::new("max", self.max, self.epoch),
            Metric::new("min", self.min, self.epoch),
            Metric::new("avg", self.avg, self.epoch),
            Metric::new("90pt", self.p90, self.epoch),
            Metric::new("75pt", self.p75, self.epoch),
        ]
    }
}

/// Answers stats queries by draining the shared history.
#[derive(Debug, Clone)]
pub struct Aggregator {
    monitor: Arc<CpuMonitor>,
}

impl Aggregator {
    pub fn new(monitor: Arc<CpuMonitor>) -> Self {
        Self { monitor }
    }

    /// Drain the current window and summarize it, stamped with the current time.
    ///
    /// Returns [`MaxcpuError::NotReady`] when fewer than two samples were
    /// collected. Either way the window is consumed and the idle clock reset.
    pub fn query(&self) -> Result<Stats> {
        self.query_at(chrono::Utc::now().timestamp())
    }

    pub fn query_at(&self, epoch: i64) -> Result<Stats> {
        self.monitor.idle().reset();
        let usages = self.monitor.drain();
        summarize(usages, epoch)
    }
}

/// Compute [`Stats`] from unsorted usages.
pub fn summarize(mut usages: Vec<f64>, epoch: i64) -> Result<Stats> {
    let n = usages.len();
    if n < 2 {
        return Err(MaxcpuError::NotReady(NOT_READY_MESSAGE.to_string()));
    }

    let sum: f64 = usages.iter().sum();
    usages.sort_by(f64::total_cmp);

    Ok(Stats {
        max: usages[nearest_rank(n, 1.0)],
        min: usages[0],
        avg: sum / n as f64,
        p90: usages[nearest_rank(n, 0.90)],
        p75: usages[nearest_rank(n, 0.75)],
        epoch,
        samples: n,
    })
}

/// Zero-based index of the `q` order statistic among `n` sorted samples:
/// `round(n * q) - 1` with halves rounded away from zero, clamped into range.
///
/// Downstream consumers key on exactly these values, so this is kept even
/// though it only approximates the nearest-rank percentile.
pub fn nearest_rank(n: usize, q: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let rank = (n as f64 * q).round() as i64 - 1;
    rank.clamp(0, n as i64 - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procstat::CpuTimes;

    #[test]
    fn nearest_rank_rounds_half_away_from_zero() {
        assert_eq!(nearest_rank(6, 1.0), 5);
        assert_eq!(nearest_rank(6, 0.90), 4); // round(5.4) - 1
        assert_eq!(nearest_rank(6, 0.75), 4); // round(4.5) - 1
        assert_eq!(nearest_rank(2, 0.75), 1); // round(1.5) - 1
        assert_eq!(nearest_rank(2, 0.10), 0); // clamped
        assert_eq!(nearest_rank(360, 0.90), 323);
    }

    #[test]
    fn six_sample_window() {
        let stats = summarize(vec![30.0, 0.0, 50.0, 10.0, 40.0, 20.0], 1_700_000_000).unwrap();
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 50.0);
        assert_eq!(stats.avg, 25.0);
        assert_eq!(stats.p90, 40.0);
        assert_eq!(stats.p75, 40.0);
        assert_eq!(stats.samples, 6);
    }

    #[test]
    fn metrics_share_epoch_and_order() {
        let stats = summarize(vec![1.0, 2.0, 3.0], 42).unwrap();
        let keys: Vec<_> = stats.metrics().iter().map(|m| m.key.clone()).collect();
        assert_eq!(keys, ["max", "min", "avg", "90pt", "75pt"]);
        assert!(stats.metrics().iter().all(|m| m.epoch == 42));
    }

    #[test]
    fn fewer_than_two_samples_is_not_ready() {
        assert!(matches!(summarize(vec![], 0), Err(MaxcpuError::NotReady(_))));
        assert!(matches!(summarize(vec![5.0], 0), Err(MaxcpuError::NotReady(_))));
    }

    fn monitor_with_samples(count: usize) -> Arc<CpuMonitor> {
        let monitor = Arc::new(CpuMonitor::new(32));
        let mut t = CpuTimes::default();
        monitor.record(t);
        for _ in 0..count {
            t.user += 0.2;
            t.idle += 0.8;
            monitor.record(t);
        }
        monitor
    }

    #[test]
    fn not_ready_still_resets_window_and_idle_clock() {
        let monitor = monitor_with_samples(1);
        let last = monitor.history().slot(1).unwrap().raw;
        monitor.idle().tick();
        monitor.idle().tick();

        let agg = Aggregator::new(monitor.clone());
        assert!(matches!(agg.query(), Err(MaxcpuError::NotReady(_))));
        assert_eq!(monitor.idle().seconds(), 0);

        let history = monitor.history();
        assert_eq!(history.current(), 0);
        assert_eq!(history.slot(0).unwrap().raw, last);
        assert_eq!(history.slot(0).unwrap().gap, None);
        assert!(history.is_empty());
    }

    #[test]
    fn empty_window_is_not_ready_and_keeps_baseline() {
        let monitor = monitor_with_samples(0);
        let baseline = monitor.history().slot(0).unwrap().raw;

        let agg = Aggregator::new(monitor.clone());
        assert!(matches!(agg.query(), Err(MaxcpuError::NotReady(_))));
        assert_eq!(monitor.history().slot(0).unwrap().raw, baseline);
    }

    #[test]
    fn query_consumes_window() {
        let monitor = monitor_with_samples(5);
        let agg = Aggregator::new(monitor.clone());

        let stats = agg.query_at(7).unwrap();
        assert_eq!(stats.samples, 5);
        assert_eq!(stats.epoch, 7);
        assert!((stats.avg - 20.0).abs() < 1e-9);

        assert!(matches!(agg.query(), Err(MaxcpuError::NotReady(_))));
    }

    #[test]
    fn concurrent_ticks_and_queries_never_see_torn_state() {
        let monitor = Arc::new(CpuMonitor::new(64));
        let writer = {
            let monitor = monitor.clone();
            std::thread::spawn(move || {
                let mut t = CpuTimes::default();
                for i in 0..5_000u32 {
                    t.user += 0.3;
                    t.system += 0.1;
                    t.idle += 0.6 + f64::from(i % 5) * 0.1;
                    monitor.record(t);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let agg = Aggregator::new(monitor.clone());
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        match agg.query() {
                            Ok(s) => {
                                assert!(s.min <= s.p75 && s.p75 <= s.p90 && s.p90 <= s.max);
                                assert!(s.min >= 0.0 && s.max <= 100.0);
                                assert!(s.avg.is_finite());
                                assert!(s.samples <= 63);
                            }
                            Err(MaxcpuError::NotReady(_)) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                        let h = agg_history(&agg);
                        assert!(h.slot(h.current()).is_some() || h.slot(0).is_none());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }

    fn agg_history(agg: &Aggregator) -> crate::cpu::History {
        agg.monitor.history()
    }
}
