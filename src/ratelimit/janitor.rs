//! Lazy eviction of idle per-key state.
//!
//! There is no background thread. Callers check [`Janitor::run_if_due`] before touching a
//! registry; once per interval one of them wins the sweep and the rest carry on untouched.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Decides when a sweep is due and makes sure only one caller performs it.
#[derive(Debug)]
pub(crate) struct Janitor {
    /// Minimum time between sweeps, also the idle age that makes state evictable
    interval_millis: u64,
    /// When the last sweep completed
    last_sweep_millis: AtomicU64,
    /// Held by the caller currently sweeping
    sweeping: Mutex<()>,
}

impl Janitor {
    /// Create a janitor whose first sweep is due one interval after `now_millis`.
    pub fn new(interval_millis: u64, now_millis: u64) -> Self {
        Self {
            interval_millis,
            last_sweep_millis: AtomicU64::new(now_millis),
            sweeping: Mutex::new(()),
        }
    }

    /// Idle age past which state is evicted.
    pub fn interval_millis(&self) -> u64 {
        self.interval_millis
    }

    /// When the last sweep completed.
    pub fn last_sweep_millis(&self) -> u64 {
        self.last_sweep_millis.load(Ordering::Acquire)
    }

    /// Whether more than one interval has passed since the last sweep.
    pub fn is_due(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.last_sweep_millis()) > self.interval_millis
    }

    /// Run `sweep` if a sweep is due and no other caller is already running one.
    ///
    /// Never blocks: a caller that loses the guard returns `None` immediately. Returns the
    /// value produced by `sweep` (the number of evicted entries) when this caller swept.
    pub fn run_if_due<F>(&self, now_millis: u64, sweep: F) -> Option<usize>
    where
        F: FnOnce() -> usize,
    {
        if !self.is_due(now_millis) {
            return None;
        }

        let _guard = self.sweeping.try_lock()?;
        // Another caller may have finished a sweep between the check and the lock.
        if !self.is_due(now_millis) {
            return None;
        }

        Some(self.sweep_locked(now_millis, sweep))
    }

    /// Run `sweep` now regardless of the interval, unless a sweep is already in progress.
    pub fn run_now<F>(&self, now_millis: u64, sweep: F) -> Option<usize>
    where
        F: FnOnce() -> usize,
    {
        let _guard = self.sweeping.try_lock()?;
        Some(self.sweep_locked(now_millis, sweep))
    }

    fn sweep_locked<F>(&self, now_millis: u64, sweep: F) -> usize
    where
        F: FnOnce() -> usize,
    {
        let evicted = sweep();
        self.last_sweep_millis.fetch_max(now_millis, Ordering::AcqRel);
        evicted
    }
}
