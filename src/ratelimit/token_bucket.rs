//! Lock-free token bucket.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::registry::IdleState;

/// A token bucket holding up to `capacity` whole tokens, refilled at `refill_rate` tokens
/// per second.
///
/// Every field that callers race on is an atomic; acquisition and refill are CAS retry loops,
/// so concurrent callers on the same bucket never block each other. Refill is lazy and happens
/// at the start of every call.
///
/// Refill uses integer floor division: `elapsed_ms * refill_rate / 1000` whole tokens. The
/// remainder is not carried over, so a caller polling faster than one token interval sees
/// slightly less throughput than the nominal rate.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens held
    capacity: u32,
    /// Tokens added per second
    refill_rate: u32,
    /// Tokens currently available, always `<= capacity`
    tokens: AtomicU32,
    /// Timestamp the last refill was credited at
    last_refill_millis: AtomicU64,
    /// Timestamp of the most recent call, read by the janitor
    last_access_millis: AtomicU64,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: u32, refill_rate: u32, now_millis: u64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: AtomicU32::new(capacity),
            last_refill_millis: AtomicU64::new(now_millis),
            last_access_millis: AtomicU64::new(now_millis),
        }
    }

    /// Try to take `tokens` from the bucket.
    ///
    /// Returns `true` and removes the tokens only if enough are available after refill.
    /// Never takes a partial amount. A request larger than the capacity can never succeed.
    /// A bucket with zero capacity or refill rate rejects every request without touching
    /// its state, as does a request for zero tokens.
    pub fn try_acquire(&self, tokens: u32, now_millis: u64) -> bool {
        if self.capacity == 0 || self.refill_rate == 0 || tokens == 0 {
            return false;
        }

        self.refill(now_millis);
        self.last_access_millis.store(now_millis, Ordering::Relaxed);

        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            if current < tokens {
                return false;
            }
            match self.tokens.compare_exchange_weak(
                current,
                current - tokens,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Tokens available right now, after crediting any owed refill.
    pub fn available_tokens(&self, now_millis: u64) -> u32 {
        self.refill(now_millis);
        self.tokens.load(Ordering::Acquire)
    }

    /// Maximum tokens held.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> u32 {
        self.refill_rate
    }

    /// Credit tokens for the time elapsed since the last refill.
    ///
    /// Only the caller that wins the CAS on `last_refill_millis` adds tokens. Losers skip:
    /// the winner already credited that interval, or it will be credited on a later call.
    fn refill(&self, now_millis: u64) {
        let last_refill = self.last_refill_millis.load(Ordering::Acquire);
        if now_millis <= last_refill {
            return;
        }

        let elapsed = now_millis - last_refill;
        // Never more than a full bucket, so the narrowing below is lossless.
        let owed = (elapsed.saturating_mul(u64::from(self.refill_rate)) / 1000)
            .min(u64::from(self.capacity)) as u32;
        if owed == 0 {
            return;
        }

        if self
            .last_refill_millis
            .compare_exchange(last_refill, now_millis, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            let refilled = current.saturating_add(owed).min(self.capacity);
            match self.tokens.compare_exchange_weak(
                current,
                refilled,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

impl IdleState for TokenBucket {
    fn last_access_millis(&self) -> u64 {
        self.last_access_millis.load(Ordering::Relaxed)
    }
}
