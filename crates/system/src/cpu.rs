use crate::procstat::CpuTimes;

/// Ring size used by the daemon: one baseline slot plus six minutes of
/// one-second samples.
pub const DEFAULT_HISTORY_SIZE: usize = 361;

/// One slot of the [`History`] ring.
///
/// `raw` is always set and serves as the baseline for the next gap. `gap` is
/// `None` only for a baseline-only slot; `usage` is additionally `None` when
/// the gap could not produce a valid percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageRecord {
    pub raw:   CpuTimes,
    pub gap:   Option<CpuTimes>,
    pub usage: Option<f64>,
}

impl UsageRecord {
    pub fn baseline(raw: CpuTimes) -> Self {
        Self {
            raw,
            gap: None,
            usage: None,
        }
    }

    /// A sample measured against the record written just before it.
    pub fn sample(raw: CpuTimes, prev: &UsageRecord) -> Self {
        let gap = raw.gap(&prev.raw);
        Self {
            raw,
            gap: Some(gap),
            usage: gap.usage(),
        }
    }
}

/// What a call to [`History::record`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recorded {
    /// Slot 0 was empty and now holds the snapshot as a baseline.
    Baseline,
    /// A sample was written to `slot`.
    Sample { slot: usize, usage: Option<f64> },
}

/// Fixed-size ring of CPU usage samples.
///
/// Slot 0 always holds the baseline the first sample of a window is measured
/// against. Samples go to slots `1..capacity`, wrapping from the last slot
/// back to 1, so the baseline is never overwritten by the ring itself.
#[derive(Debug, Clone)]
pub struct History {
    slots:   Vec<Option<UsageRecord>>,
    current: usize,
}

impl History {
    /// `capacity` counts the baseline slot; at least two slots are kept.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots:   vec![None; capacity.max(2)],
            current: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot written most recently.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn slot(&self, index: usize) -> Option<&UsageRecord> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Number of sample slots in use (the baseline slot is not counted).
    pub fn len(&self) -> usize {
        self.slots[1..].iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a snapshot, measuring it against the current slot.
    pub fn record(&mut self, raw: CpuTimes) -> Recorded {
        let prev = match self.slots[self.current] {
            Some(prev) if self.slots[0].is_some() => prev,
            _ => {
                self.reset_to(UsageRecord::baseline(raw));
                return Recorded::Baseline;
            }
        };

        let mut next = self.current + 1;
        if next >= self.slots.len() {
            next = 1;
        }

        let record = UsageRecord::sample(raw, &prev);
        self.slots[next] = Some(record);
        self.current = next;

        Recorded::Sample {
            slot:  next,
            usage: record.usage,
        }
    }

    /// Collect every valid usage and start a new window.
    ///
    /// The most recent raw snapshot becomes the new baseline in slot 0 so the
    /// next sample still has something to be measured against.
    pub fn drain(&mut self) -> Vec<f64> {
        let usages = self.slots[1..]
            .iter()
            .flatten()
            .filter_map(|r| r.usage)
            .collect();

        match self.slots[self.current] {
            Some(last) => self.reset_to(UsageRecord::baseline(last.raw)),
            None => {
                self.slots.iter_mut().for_each(|s| *s = None);
                self.current = 0;
            }
        }

        usages
    }

    fn reset_to(&mut self, baseline: UsageRecord) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.slots[0] = Some(baseline);
        self.current = 0;
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
