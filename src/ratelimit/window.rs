//! Fixed-window ("sliding window") request counter.

use std::sync::atomic::{AtomicU64, Ordering};

use super::registry::IdleState;

/// A counter admitting at most `limit` requests per window of `window_size_secs`.
///
/// Windows are tumbling: each one starts at the first call that finds the previous window
/// expired, and the count restarts from that call. Because the count resets wholesale,
/// a burst straddling a boundary can be admitted up to `2 * limit` times in less than one
/// window length.
///
/// This counter is thread-safe and uses atomic operations for lock-free updates.
#[derive(Debug)]
pub struct SlidingWindow {
    /// Window length in seconds
    window_size_secs: u32,
    /// Admissions allowed per window
    limit: u32,
    /// Calls seen in the current window, including rejected ones
    count: AtomicU64,
    /// When the current window started
    window_start_millis: AtomicU64,
    /// Timestamp of the most recent call, read by the janitor
    last_access_millis: AtomicU64,
}

impl SlidingWindow {
    /// Create an empty window starting now.
    pub fn new(window_size_secs: u32, limit: u32, now_millis: u64) -> Self {
        Self {
            window_size_secs,
            limit,
            count: AtomicU64::new(0),
            window_start_millis: AtomicU64::new(now_millis),
            last_access_millis: AtomicU64::new(now_millis),
        }
    }

    /// Count one request and report whether it fits in the current window.
    ///
    /// A window with zero size or zero limit rejects every request without touching its state.
    pub fn try_acquire(&self, now_millis: u64) -> bool {
        if self.window_size_secs == 0 || self.limit == 0 {
            return false;
        }

        self.last_access_millis.store(now_millis, Ordering::Relaxed);

        let window_start = self.window_start_millis.load(Ordering::Acquire);
        if self.is_expired(window_start, now_millis)
            && self
                .window_start_millis
                .compare_exchange(window_start, now_millis, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            // The caller that opens a new window is its first admission.
            self.count.store(1, Ordering::Release);
            return true;
        }

        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        count <= u64::from(self.limit)
    }

    /// Calls counted in the current window, or 0 if the window has expired.
    pub fn current_count(&self, now_millis: u64) -> u64 {
        let window_start = self.window_start_millis.load(Ordering::Acquire);
        if self.is_expired(window_start, now_millis) {
            return 0;
        }
        self.count.load(Ordering::Acquire)
    }

    /// Window length in seconds.
    pub fn window_size_secs(&self) -> u32 {
        self.window_size_secs
    }

    /// Admissions allowed per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn window_millis(&self) -> u64 {
        u64::from(self.window_size_secs) * 1000
    }

    fn is_expired(&self, window_start: u64, now_millis: u64) -> bool {
        now_millis.saturating_sub(window_start) >= self.window_millis()
    }
}

impl IdleState for SlidingWindow {
    fn last_access_millis(&self) -> u64 {
        self.last_access_millis.load(Ordering::Relaxed)
    }
}
