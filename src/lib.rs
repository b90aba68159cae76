//! Admission - keyed in-process rate limiting
//!
//! This crate decides, per caller-defined key, whether a unit of work may proceed. It offers
//! a burst-tolerant token bucket and a strict fixed-window counter, both lock-free under
//! concurrent callers. Idle per-key state is reclaimed lazily by the callers themselves;
//! there is no background thread.
//!
//! ```
//! use admission::RateLimiter;
//!
//! let limiter = RateLimiter::new();
//! assert!(limiter.try_acquire_token_bucket("sms:+15550100", 5, 1, 1));
//! assert!(limiter.try_acquire_sliding_window("verify:alice", 60, 3));
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LimiterConfig;
pub use error::{AdmissionError, Result};
pub use ratelimit::{LimiterStats, RateLimitInfo, RateLimitKey, RateLimiter};
