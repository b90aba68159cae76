//! Rate limit key validation and handling.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{AdmissionError, Result};

/// A key that partitions rate limit state.
///
/// Keys are opaque to the limiter; callers typically compose them from a purpose and a
/// subject, e.g. `"sms:+15550100"`. State under different keys never interacts.
///
/// A key must contain at least one non-whitespace character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Create a key, rejecting blank input.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if is_blank(&key) {
            return Err(AdmissionError::InvalidKey);
        }
        Ok(Self(key))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Whether `key` is empty or whitespace only.
pub(crate) fn is_blank(key: &str) -> bool {
    key.trim().is_empty()
}

// Lets registries keyed by `RateLimitKey` be queried with a plain `&str`.
impl Borrow<str> for RateLimitKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RateLimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for RateLimitKey {
    type Error = AdmissionError;

    fn try_from(key: &str) -> Result<Self> {
        Self::new(key)
    }
}
