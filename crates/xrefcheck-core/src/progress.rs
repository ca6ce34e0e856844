//! Shared verification progress counters.
//!
//! Counters are plain atomics: many probe tasks bump them concurrently and
//! a display task samples them at its own pace. When the progress bar is
//! disabled the counters still advance, so the final summary stays accurate.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A monotonic `{done, total, errors}` counter.
#[derive(Debug, Default)]
pub struct Progress {
    done: AtomicUsize,
    total: AtomicUsize,
    errors: AtomicUsize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn tick(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Merge another counter into this one under max semantics. Counters
    /// are monotonic, so the pointwise maximum is the most advanced state
    /// either side has observed.
    pub fn merge_max(&self, other: &Progress) {
        self.done.fetch_max(other.done(), Ordering::Relaxed);
        self.total.fetch_max(other.total(), Ordering::Relaxed);
        self.errors.fetch_max(other.errors(), Ordering::Relaxed);
    }
}

/// Progress of one verification run, split by check family.
#[derive(Debug, Default)]
pub struct VerifyProgress {
    /// Local file and anchor checks.
    pub local: Progress,
    /// External URL probes.
    pub external: Progress,
    /// External probes that entered (and possibly recovered from) a
    /// rate-limit retry; `total` counts entries, `done` counts recoveries.
    pub external_fixable: Progress,
}

impl VerifyProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate() {
        let progress = Progress::new();
        progress.set_total(3);
        progress.tick();
        progress.tick_error();
        assert_eq!(progress.done(), 2);
        assert_eq!(progress.total(), 3);
        assert_eq!(progress.errors(), 1);
    }

    #[test]
    fn merge_takes_pointwise_maximum() {
        let a = Progress::new();
        a.set_total(10);
        a.tick();
        a.tick();

        let b = Progress::new();
        b.set_total(8);
        b.tick_error();

        a.merge_max(&b);
        assert_eq!(a.done(), 2);
        assert_eq!(a.total(), 10);
        assert_eq!(a.errors(), 1);

        b.merge_max(&a);
        assert_eq!(b.done(), 2);
        assert_eq!(b.total(), 10);
        assert_eq!(b.errors(), 1);
    }
}
