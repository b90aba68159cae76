//! Rate limiting algorithms and per-key state management.

mod janitor;
mod key;
mod limiter;
mod registry;
mod token_bucket;
mod window;

pub use key::RateLimitKey;
pub use limiter::{LimiterStats, RateLimitInfo, RateLimiter};
pub use token_bucket::TokenBucket;
pub use window::SlidingWindow;
