//! Concurrent per-key state storage.

use std::sync::Arc;

use dashmap::DashMap;

use super::key::RateLimitKey;
use crate::error::Result;

/// Per-key state that records when it was last used.
pub(crate) trait IdleState: Send + Sync {
    /// Timestamp of the most recent call against this state.
    fn last_access_millis(&self) -> u64;
}

/// Maps each key to exactly one shared state instance, created on first use.
///
/// Backed by a sharded [`DashMap`], so lookups and inserts on different keys proceed in
/// parallel and bulk eviction never takes a global lock. State is handed out as `Arc<S>`
/// and no map guard is held while callers work on it.
#[derive(Debug)]
pub(crate) struct KeyedRegistry<S> {
    entries: DashMap<RateLimitKey, Arc<S>>,
}

impl<S: IdleState> KeyedRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Look up the state for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<S>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Return the state for `key`, creating it with `init` if absent.
    ///
    /// Creation is atomic: concurrent callers racing on a new key all receive the same
    /// instance, and `init` runs at most once per insertion. Fails only for a blank key.
    pub fn get_or_insert_with<F>(&self, key: &str, init: F) -> Result<Arc<S>>
    where
        F: FnOnce() -> S,
    {
        if let Some(state) = self.get(key) {
            return Ok(state);
        }

        let key = RateLimitKey::new(key)?;
        let entry = self.entries.entry(key).or_insert_with(|| Arc::new(init()));
        Ok(Arc::clone(entry.value()))
    }

    /// Drop the state for `key`. Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove every entry idle for longer than `max_idle_millis` as of `now_millis`.
    ///
    /// Returns how many entries were evicted. A caller still holding an evicted `Arc` keeps
    /// working on the detached instance; the next lookup creates fresh state.
    pub fn evict_idle(&self, now_millis: u64, max_idle_millis: u64) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, state| {
            let idle = now_millis.saturating_sub(state.last_access_millis());
            let keep = idle <= max_idle_millis;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<S: IdleState> Default for KeyedRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
