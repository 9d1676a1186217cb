//! Expiry-Indexed Storage
//!
//! A provider keeps two indices in step: key → [`Entry`] for point
//! lookups, and deadline bucket → keys so that "what is due by `t`" never
//! scans the whole key space.
//!
//! ```text
//!   key space                      bucket index
//! ┌──────────────────────────┐   ┌───────────────────────────┐
//! │ "a" → {jobs:1700, "A"}   │──>│ jobs:1700 → ["b", "a"]    │
//! │ "b" → {jobs:1700, "B"}   │──>│                           │
//! │ "c" → {jobs:1760, "C"}   │──>│ jobs:1760 → ["c"]         │
//! └──────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! Every live key sits in exactly one bucket, the one named by its
//! entry. A bucket exists only while it has members.
//!
//! Two providers are available:
//!
//! - [`MemProvider`]: both indices in process memory under one `RwLock`
//! - [`SharedProvider`]: the same model laid over a [`Backend`](crate::backend::Backend)
//!
//! Bucket keys have the form `prefix:deadline`. Deadlines are always
//! compared as integers, never as text.

mod entry;
pub mod memory;
pub mod registry;
pub mod shared;

pub use entry::Entry;
pub use memory::MemProvider;
pub use registry::Registry;
pub use shared::SharedProvider;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Result of a [`Provider::before`] scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Due {
    /// Every due key with its current value
    pub entries: HashMap<String, String>,
    /// Bucket keys visited with a deadline at or before the threshold
    pub buckets: Vec<String>,
}

impl Due {
    pub fn has_any(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A storage backend for timer keys.
///
/// `set_prefix` must be called before any other operation and must not
/// race with them.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Sets the namespace qualifying every key this instance touches.
    fn set_prefix(&self, prefix: &str);

    /// Looks up a key. An absent key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, due `ttl` seconds from now. An existing
    /// key is moved out of its old bucket first. A `ttl` of zero or less
    /// makes the key due on the next sweep.
    async fn set(&self, key: &str, value: &str, ttl: i64) -> Result<()>;

    /// Removes a key. Removing an absent key is a no-op.
    async fn del(&self, key: &str) -> Result<()>;

    /// Collects every key in a bucket with deadline `<= threshold`
    /// (Unix seconds). Deletes nothing.
    async fn before(&self, threshold: i64) -> Result<Due>;

    /// Drops index bookkeeping for `buckets` that no longer hold live keys.
    /// Called by the sweep after due keys have been deleted.
    async fn prune(&self, _buckets: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Current time in Unix seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Absolute deadline for a key set now with `ttl` seconds.
pub(crate) fn deadline_after(ttl: i64) -> i64 {
    now_unix().saturating_add(ttl)
}

/// Builds `prefix:deadline`.
pub fn bucket_key(prefix: &str, deadline: i64) -> String {
    format!("{}:{}", prefix, deadline)
}

/// Parses the deadline back out of a bucket key. The prefix may itself
/// contain `:`, so only the last segment is read.
pub fn bucket_deadline(bucket_key: &str) -> Option<i64> {
    bucket_key
        .rsplit_once(':')
        .and_then(|(_, deadline)| deadline.parse().ok())
}
