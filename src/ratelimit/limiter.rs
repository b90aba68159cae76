//! Core rate limiter implementation.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, trace};

use super::janitor::Janitor;
use super::key::is_blank;
use super::registry::KeyedRegistry;
use super::token_bucket::TokenBucket;
use super::window::SlidingWindow;
use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::Result;

/// The rate limiter that owns per-key token buckets and sliding windows.
///
/// This struct is thread-safe and meant to be shared behind an `Arc`. Every operation is
/// synchronous and non-blocking: per-key state is updated with atomic CAS loops, and the
/// registries are sharded maps. Each limiter owns its own state, so independently
/// configured limiters can coexist in one process.
///
/// Limits are passed on each call but only take effect when a key's state is first
/// created; later calls with different limits reuse the existing state until the key is
/// reset or evicted.
pub struct RateLimiter {
    /// Token buckets indexed by key
    buckets: KeyedRegistry<TokenBucket>,
    /// Sliding windows indexed by key
    windows: KeyedRegistry<SlidingWindow>,
    /// Lazy idle-state eviction
    janitor: Janitor,
    /// Defaults for the shorthand operations
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
}

/// Snapshot of the limiter state for one key.
///
/// Fields for an algorithm the key has never used (or an unknown key) are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    /// The key this snapshot describes
    pub key: String,
    /// Tokens available in the key's bucket
    pub available_tokens: u32,
    /// Bucket capacity
    pub bucket_capacity: u32,
    /// Bucket refill rate in tokens per second
    pub refill_rate: u32,
    /// Calls counted in the key's current window
    pub current_count: u64,
    /// Admissions allowed per window
    pub window_limit: u32,
    /// Window length in seconds
    pub window_size_secs: u32,
}

impl fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: tokens {}/{} (+{}/s), window {}/{} per {}s",
            self.key,
            self.available_tokens,
            self.bucket_capacity,
            self.refill_rate,
            self.current_count,
            self.window_limit,
            self.window_size_secs
        )
    }
}

/// Registry sizes, for monitoring key growth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    /// Keys with token bucket state
    pub token_buckets: usize,
    /// Keys with sliding window state
    pub sliding_windows: usize,
    /// When the janitor last swept
    pub last_cleanup_millis: u64,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings and the system clock.
    pub fn new() -> Self {
        Self::from_parts(LimiterConfig::default(), Arc::new(SystemClock))
    }

    /// Create a rate limiter from a configuration, validating it first.
    pub fn with_config(config: LimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, Arc::new(SystemClock)))
    }

    /// Override the clock (useful for deterministic tests).
    ///
    /// The janitor's interval restarts from the new clock's current time.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self.janitor = Janitor::new(
            self.config.janitor.cleanup_interval_ms,
            self.clock.now_millis(),
        );
        self
    }

    fn from_parts(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let janitor = Janitor::new(config.janitor.cleanup_interval_ms, clock.now_millis());
        Self {
            buckets: KeyedRegistry::new(),
            windows: KeyedRegistry::new(),
            janitor,
            config,
            clock,
        }
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Take one token from `key`'s bucket using the default capacity and refill rate.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_tokens(key, 1)
    }

    /// Take `tokens` from `key`'s bucket using the default capacity and refill rate.
    pub fn try_acquire_tokens(&self, key: &str, tokens: u32) -> bool {
        let defaults = &self.config.token_bucket;
        self.try_acquire_token_bucket(key, defaults.capacity, defaults.refill_rate, tokens)
    }

    /// Token bucket admission.
    ///
    /// Returns `true` if `tokens` were taken from `key`'s bucket. Returns `false` when the
    /// bucket is short, when `tokens > capacity`, and for invalid input (blank key or a zero
    /// capacity, rate, or token count), which leaves all state untouched.
    pub fn try_acquire_token_bucket(
        &self,
        key: &str,
        capacity: u32,
        refill_rate: u32,
        tokens: u32,
    ) -> bool {
        if is_blank(key) || capacity == 0 || refill_rate == 0 || tokens == 0 {
            debug!(
                key = %key,
                capacity,
                refill_rate,
                tokens,
                "Rejecting token bucket request with invalid input"
            );
            return false;
        }

        let now = self.clock.now_millis();
        self.cleanup_if_needed(now);

        let bucket = match self.buckets.get_or_insert_with(key, || {
            debug!(key = %key, capacity, refill_rate, "Creating new token bucket");
            TokenBucket::new(capacity, refill_rate, now)
        }) {
            Ok(bucket) => bucket,
            Err(err) => {
                debug!(key = %key, error = %err, "Token bucket lookup failed");
                return false;
            }
        };

        let allowed = bucket.try_acquire(tokens, now);
        trace!(key = %key, tokens, allowed, "Token bucket decision");
        if !allowed {
            debug!(key = %key, tokens, "Token bucket exhausted");
        }
        allowed
    }

    /// Sliding window admission using the default window size and limit.
    pub fn check_sliding_window(&self, key: &str) -> bool {
        let defaults = &self.config.sliding_window;
        self.try_acquire_sliding_window(key, defaults.window_size_secs, defaults.limit)
    }

    /// Sliding window admission.
    ///
    /// Counts one call against `key`'s current window and returns `true` if it is within
    /// `limit`. The first call after a window expires opens a new one and is always
    /// admitted. Invalid input (blank key, zero window size or limit) returns `false`
    /// without touching state.
    pub fn try_acquire_sliding_window(&self, key: &str, window_size_secs: u32, limit: u32) -> bool {
        if is_blank(key) || window_size_secs == 0 || limit == 0 {
            debug!(
                key = %key,
                window_size_secs,
                limit,
                "Rejecting sliding window request with invalid input"
            );
            return false;
        }

        let now = self.clock.now_millis();
        self.cleanup_if_needed(now);

        let window = match self.windows.get_or_insert_with(key, || {
            debug!(key = %key, window_size_secs, limit, "Creating new sliding window");
            SlidingWindow::new(window_size_secs, limit, now)
        }) {
            Ok(window) => window,
            Err(err) => {
                debug!(key = %key, error = %err, "Sliding window lookup failed");
                return false;
            }
        };

        let allowed = window.try_acquire(now);
        trace!(key = %key, allowed, "Sliding window decision");
        if !allowed {
            debug!(key = %key, limit, "Sliding window limit exceeded");
        }
        allowed
    }

    /// Tokens currently available in `key`'s bucket, or 0 if it has none.
    pub fn available_tokens(&self, key: &str) -> u32 {
        self.buckets
            .get(key)
            .map(|bucket| bucket.available_tokens(self.clock.now_millis()))
            .unwrap_or(0)
    }

    /// Calls counted in `key`'s current window, or 0 if it has none or it has expired.
    pub fn current_count(&self, key: &str) -> u64 {
        self.windows
            .get(key)
            .map(|window| window.current_count(self.clock.now_millis()))
            .unwrap_or(0)
    }

    /// Drop both the bucket and the window for `key`.
    ///
    /// The next call on `key` behaves as if the key had never been seen.
    pub fn reset(&self, key: &str) {
        let bucket = self.buckets.remove(key);
        let window = self.windows.remove(key);
        debug!(key = %key, bucket, window, "Reset rate limit state");
    }

    /// Drop all state for every key.
    pub fn reset_all(&self) {
        self.buckets.clear();
        self.windows.clear();
        info!("Reset all rate limit state");
    }

    /// Snapshot of both algorithms' state for `key`.
    pub fn rate_limit_info(&self, key: &str) -> RateLimitInfo {
        let now = self.clock.now_millis();
        let mut info = RateLimitInfo {
            key: key.to_string(),
            ..RateLimitInfo::default()
        };

        if let Some(bucket) = self.buckets.get(key) {
            info.available_tokens = bucket.available_tokens(now);
            info.bucket_capacity = bucket.capacity();
            info.refill_rate = bucket.refill_rate();
        }
        if let Some(window) = self.windows.get(key) {
            info.current_count = window.current_count(now);
            info.window_limit = window.limit();
            info.window_size_secs = window.window_size_secs();
        }
        info
    }

    /// Registry sizes and the last sweep time.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            token_buckets: self.buckets.len(),
            sliding_windows: self.windows.len(),
            last_cleanup_millis: self.janitor.last_sweep_millis(),
        }
    }

    /// Evict idle state now instead of waiting for the next due sweep.
    ///
    /// Returns the number of evicted entries, or 0 if another sweep is in progress.
    pub fn cleanup_now(&self) -> usize {
        let now = self.clock.now_millis();
        self.janitor
            .run_now(now, || self.evict_idle(now))
            .unwrap_or(0)
    }

    fn cleanup_if_needed(&self, now: u64) {
        self.janitor.run_if_due(now, || self.evict_idle(now));
    }

    fn evict_idle(&self, now: u64) -> usize {
        let max_idle = self.janitor.interval_millis();
        let buckets = self.buckets.evict_idle(now, max_idle);
        let windows = self.windows.evict_idle(now, max_idle);

        if buckets + windows > 0 {
            info!(
                buckets,
                windows,
                remaining_buckets = self.buckets.len(),
                remaining_windows = self.windows.len(),
                "Evicted idle rate limit state"
            );
        } else {
            trace!("Idle sweep found nothing to evict");
        }
        buckets + windows
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("token_buckets", &self.buckets.len())
            .field("sliding_windows", &self.windows.len())
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::JanitorConfig;

    fn test_limiter() -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let limiter = RateLimiter::new().with_clock(clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let (limiter, _) = test_limiter();
        assert_eq!(limiter.stats().token_buckets, 0);
        assert_eq!(limiter.stats().sliding_windows, 0);
    }

    #[test]
    fn test_token_bucket_creates_state() {
        let (limiter, _) = test_limiter();

        assert!(limiter.try_acquire_token_bucket("sms:1", 5, 1, 1));
        assert_eq!(limiter.stats().token_buckets, 1);
        assert_eq!(limiter.available_tokens("sms:1"), 4);
    }

    #[test]
    fn test_default_token_bucket() {
        let (limiter, _) = test_limiter();

        for _ in 0..100 {
            assert!(limiter.try_acquire("default"));
        }
        assert!(!limiter.try_acquire("default"));

        let info = limiter.rate_limit_info("default");
        assert_eq!(info.bucket_capacity, 100);
        assert_eq!(info.refill_rate, 10);
    }

    #[test]
    fn test_try_acquire_tokens_uses_defaults() {
        let (limiter, _) = test_limiter();
        assert!(limiter.try_acquire_tokens("batch", 60));
        assert!(!limiter.try_acquire_tokens("batch", 41));
        assert!(limiter.try_acquire_tokens("batch", 40));
    }

    #[test]
    fn test_default_sliding_window() {
        let (limiter, _) = test_limiter();
        assert!(limiter.check_sliding_window("w"));

        let info = limiter.rate_limit_info("w");
        assert_eq!(info.window_limit, 1000);
        assert_eq!(info.window_size_secs, 60);
        assert_eq!(info.current_count, 1);
    }

    #[test]
    fn test_invalid_input_rejected_without_state() {
        let (limiter, _) = test_limiter();

        assert!(!limiter.try_acquire_token_bucket("", 5, 1, 1));
        assert!(!limiter.try_acquire_token_bucket("   ", 5, 1, 1));
        assert!(!limiter.try_acquire_token_bucket("k", 0, 1, 1));
        assert!(!limiter.try_acquire_token_bucket("k", 5, 0, 1));
        assert!(!limiter.try_acquire_token_bucket("k", 5, 1, 0));
        assert!(!limiter.try_acquire_sliding_window("", 60, 3));
        assert!(!limiter.try_acquire_sliding_window("k", 0, 3));
        assert!(!limiter.try_acquire_sliding_window("k", 60, 0));

        assert_eq!(
            limiter.stats(),
            LimiterStats {
                last_cleanup_millis: 1_000_000,
                ..LimiterStats::default()
            }
        );
    }

    #[test]
    fn test_invalid_tokens_do_not_drain_existing_bucket() {
        let (limiter, _) = test_limiter();
        assert!(limiter.try_acquire_token_bucket("k", 5, 1, 1));
        assert!(!limiter.try_acquire_token_bucket("k", 5, 1, 0));
        assert_eq!(limiter.available_tokens("k"), 4);
    }

    #[test]
    fn test_first_parameters_win_for_existing_key() {
        let (limiter, _) = test_limiter();
        assert!(limiter.try_acquire_token_bucket("k", 2, 1, 1));
        assert!(limiter.try_acquire_token_bucket("k", 50, 1, 1));
        assert!(!limiter.try_acquire_token_bucket("k", 50, 1, 1));
        assert_eq!(limiter.rate_limit_info("k").bucket_capacity, 2);
    }

    #[test]
    fn test_algorithms_are_independent_per_key() {
        let (limiter, _) = test_limiter();
        assert!(limiter.try_acquire_token_bucket("k", 1, 1, 1));
        assert!(!limiter.try_acquire_token_bucket("k", 1, 1, 1));
        assert!(limiter.try_acquire_sliding_window("k", 60, 1));
        assert!(limiter.try_acquire_token_bucket("other", 1, 1, 1));
    }

    #[test]
    fn test_unknown_key_reads_zero() {
        let (limiter, _) = test_limiter();
        assert_eq!(limiter.available_tokens("nope"), 0);
        assert_eq!(limiter.current_count("nope"), 0);
        assert_eq!(limiter.current_count(""), 0);

        let info = limiter.rate_limit_info("nope");
        assert_eq!(
            info,
            RateLimitInfo {
                key: "nope".to_string(),
                ..RateLimitInfo::default()
            }
        );
    }

    #[test]
    fn test_reset_key() {
        let (limiter, _) = test_limiter();
        limiter.try_acquire_token_bucket("k", 1, 1, 1);
        limiter.try_acquire_sliding_window("k", 60, 1);
        limiter.try_acquire_token_bucket("other", 1, 1, 1);

        limiter.reset("k");
        assert_eq!(limiter.stats().token_buckets, 1);
        assert_eq!(limiter.stats().sliding_windows, 0);
        assert!(limiter.try_acquire_token_bucket("k", 1, 1, 1));
        assert!(limiter.try_acquire_sliding_window("k", 60, 1));
        assert!(!limiter.try_acquire_token_bucket("other", 1, 1, 1));
    }

    #[test]
    fn test_reset_all() {
        let (limiter, _) = test_limiter();
        limiter.try_acquire("a");
        limiter.check_sliding_window("b");

        limiter.reset_all();
        assert_eq!(limiter.stats().token_buckets, 0);
        assert_eq!(limiter.stats().sliding_windows, 0);
    }

    #[test]
    fn test_idle_state_evicted_by_later_call() {
        let (limiter, clock) = test_limiter();
        limiter.try_acquire_token_bucket("idle", 1, 1, 1);
        limiter.try_acquire_sliding_window("idle-window", 60, 1);

        clock.advance(300_001);
        assert!(limiter.try_acquire_token_bucket("active", 1, 1, 1));

        let stats = limiter.stats();
        assert_eq!(stats.token_buckets, 1);
        assert_eq!(stats.sliding_windows, 0);
        assert_eq!(stats.last_cleanup_millis, 1_300_001);
        assert_eq!(limiter.rate_limit_info("idle").bucket_capacity, 0);
    }

    #[test]
    fn test_recently_used_state_survives_sweep() {
        let (limiter, clock) = test_limiter();
        limiter.try_acquire_token_bucket("busy", 3, 1, 1);

        clock.advance(200_000);
        limiter.try_acquire_token_bucket("busy", 3, 1, 1);
        clock.advance(100_001);
        limiter.try_acquire_token_bucket("busy", 3, 1, 1);

        assert_eq!(limiter.stats().token_buckets, 1);
        assert_eq!(limiter.stats().last_cleanup_millis, 1_300_001);
    }

    #[test]
    fn test_no_sweep_before_interval() {
        let (limiter, clock) = test_limiter();
        limiter.try_acquire("stale");
        clock.advance(300_000);
        limiter.try_acquire("fresh");
        assert_eq!(limiter.stats().token_buckets, 2);
    }

    #[test]
    fn test_cleanup_now() {
        let config = LimiterConfig {
            janitor: JanitorConfig {
                cleanup_interval_ms: 1_000,
            },
            ..LimiterConfig::default()
        };
        let clock = ManualClock::new(0);
        let limiter = RateLimiter::with_config(config)
            .unwrap()
            .with_clock(clock.clone());

        limiter.try_acquire("a");
        limiter.check_sliding_window("a");
        clock.advance(1_001);

        assert_eq!(limiter.cleanup_now(), 2);
        assert_eq!(limiter.cleanup_now(), 0);
        assert_eq!(limiter.stats().last_cleanup_millis, 1_001);
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let mut config = LimiterConfig::default();
        config.sliding_window.limit = 0;
        assert!(RateLimiter::with_config(config).is_err());
    }

    #[test]
    fn test_rate_limit_info_display() {
        let (limiter, _) = test_limiter();
        limiter.try_acquire_token_bucket("k", 5, 2, 1);
        limiter.try_acquire_sliding_window("k", 60, 3);

        assert_eq!(
            limiter.rate_limit_info("k").to_string(),
            "k: tokens 4/5 (+2/s), window 1/3 per 60s"
        );
    }
}
