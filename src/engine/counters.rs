//! Run-scoped progress counters.

use parking_lot::Mutex;

use crate::utils::AppInstant;

/// Items consumed and items matched, each behind its own lock.
///
/// Every item bumps `processed` exactly once (through a [`ProcessedTicket`])
/// before it can bump `matched`, so `matched <= processed` at all times.
#[derive(Debug)]
pub struct ProgressCounters {
    processed: Mutex<u64>,
    matched: Mutex<u64>,
    started: AppInstant,
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self {
            processed: Mutex::new(0),
            matched: Mutex::new(0),
            started: AppInstant::now(),
        }
    }

    pub fn processed(&self) -> u64 {
        *self.processed.lock()
    }

    pub fn matched(&self) -> u64 {
        *self.matched.lock()
    }

    /// Counts one consumed item when committed or dropped, whichever comes first.
    pub fn ticket(&self) -> ProcessedTicket<'_> {
        ProcessedTicket {
            counters: self,
            committed: false,
        }
    }

    /// Returns the new matched count.
    pub(crate) fn record_match(&self) -> u64 {
        let mut matched = self.matched.lock();
        *matched += 1;
        *matched
    }

    fn record_processed(&self) -> u64 {
        let mut processed = self.processed.lock();
        *processed += 1;
        *processed
    }

    /// Consistent view for reporting. `matched` is read first: it can only grow
    /// after `processed` has, so the pair never shows more matches than items.
    pub fn progress(&self, total: u64) -> Progress {
        let matched = self.matched();
        let processed = self.processed();
        Progress {
            total,
            processed,
            matched,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Exactly-once guard for the processed counter.
pub struct ProcessedTicket<'a> {
    counters: &'a ProgressCounters,
    committed: bool,
}

impl ProcessedTicket<'_> {
    /// Count the item now. Later calls are no-ops.
    pub fn commit(&mut self) -> Option<u64> {
        if self.committed {
            return None;
        }
        self.committed = true;
        Some(self.counters.record_processed())
    }
}

impl Drop for ProcessedTicket<'_> {
    fn drop(&mut self) {
        self.commit();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub total: u64,
    pub processed: u64,
    pub matched: u64,
    pub elapsed_secs: f64,
}

impl Progress {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn items_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.processed as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.0}%] {}/{} processed, {} matched ({:.1} items/s)",
            self.percentage(),
            self.processed,
            self.total,
            self.matched,
            self.items_per_sec()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_counts_once_whether_committed_or_dropped() {
        let counters = ProgressCounters::new();
        {
            let mut t = counters.ticket();
            assert_eq!(t.commit(), Some(1));
            assert_eq!(t.commit(), None);
        }
        {
            let _t = counters.ticket();
        }
        assert_eq!(counters.processed(), 2);
    }

    #[test]
    fn ticket_counts_when_unwinding() {
        let counters = ProgressCounters::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _t = counters.ticket();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(counters.processed(), 1);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counters = ProgressCounters::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        counters.ticket().commit();
                        counters.record_match();
                    }
                });
            }
        });
        let p = counters.progress(8000);
        assert_eq!(p.processed, 8000);
        assert_eq!(p.matched, 8000);
        assert_eq!(p.percentage(), 100.0);
    }
}
