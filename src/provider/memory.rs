//! In-Process Provider
//!
//! Both indices live behind a single `RwLock`: lookups and scans take the
//! read side and may run together, `set`/`del` take the write side and
//! therefore see and leave both maps consistent.
//!
//! The bucket index is a `BTreeMap` keyed by deadline, so `before(t)` is
//! a range query over `..=t` rather than a walk over every bucket.

use crate::error::Result;
use crate::provider::{bucket_key, deadline_after, Due, Entry, Provider};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Index {
    entries: HashMap<String, Entry>,
    /// Deadline → keys, newest insertion at the front
    buckets: BTreeMap<i64, VecDeque<String>>,
}

impl Index {
    /// Removes `key` from the bucket named by `entry`, dropping the bucket
    /// once it is empty.
    fn unlink(&mut self, key: &str, entry: &Entry) {
        let Some(deadline) = entry.deadline() else {
            return;
        };
        if let Some(keys) = self.buckets.get_mut(&deadline) {
            if let Some(pos) = keys.iter().position(|k| k == key) {
                keys.remove(pos);
            }
            if keys.is_empty() {
                self.buckets.remove(&deadline);
            }
        }
    }
}

/// [`Provider`] holding everything in process memory.
///
/// # Example
///
/// ```
/// use timerstore::provider::{MemProvider, Provider};
///
/// # tokio_test::block_on(async {
/// let mem = MemProvider::new();
/// mem.set_prefix("sessions");
/// mem.set("user:1", "token", 60).await.unwrap();
/// assert_eq!(mem.get("user:1").await.unwrap().as_deref(), Some("token"));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemProvider {
    prefix: RwLock<String>,
    index: RwLock<Index>,
}

impl MemProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> String {
        self.prefix.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-empty buckets.
    pub fn bucket_count(&self) -> usize {
        self.index.read().unwrap_or_else(|e| e.into_inner()).buckets.len()
    }
}

#[async_trait]
impl Provider for MemProvider {
    fn set_prefix(&self, prefix: &str) {
        *self.prefix.write().unwrap_or_else(|e| e.into_inner()) = prefix.to_string();
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(index.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: i64) -> Result<()> {
        let deadline = deadline_after(ttl);
        let bucket = bucket_key(&self.prefix(), deadline);

        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = index.entries.remove(key) {
            index.unlink(key, &old);
        }

        index
            .buckets
            .entry(deadline)
            .or_default()
            .push_front(key.to_string());
        index
            .entries
            .insert(key.to_string(), Entry::new(bucket, value.to_string()));

        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = index.entries.remove(key) {
            index.unlink(key, &old);
        }
        Ok(())
    }

    async fn before(&self, threshold: i64) -> Result<Due> {
        let prefix = self.prefix();
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());

        let mut due = Due::default();
        for (&deadline, keys) in index.buckets.range(..=threshold) {
            due.buckets.push(bucket_key(&prefix, deadline));
            for key in keys {
                if let Some(entry) = index.entries.get(key) {
                    due.entries.insert(key.clone(), entry.value.clone());
                }
            }
        }

        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::now_unix;
    use std::sync::Arc;

    fn provider() -> MemProvider {
        let mem = MemProvider::new();
        mem.set_prefix("Test");
        mem
    }

    #[tokio::test]
    async fn test_set_prefix() {
        let mem = provider();
        assert_eq!(mem.prefix(), "Test");
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let mem = provider();
        mem.set("first", "this is the first", 5).await.unwrap();
        assert_eq!(
            mem.get("first").await.unwrap().as_deref(),
            Some("this is the first")
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_an_error() {
        let mem = provider();
        assert_eq!(mem.get("never").await.unwrap(), None);

        mem.set("gone", "v", 5).await.unwrap();
        mem.del("gone").await.unwrap();
        assert_eq!(mem.get("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_relocation_leaves_one_bucket() {
        let mem = provider();
        mem.set("k", "v1", 5).await.unwrap();
        mem.set("k", "v2", 100).await.unwrap();

        assert_eq!(mem.len(), 1);
        assert_eq!(mem.bucket_count(), 1);
        assert_eq!(mem.get("k").await.unwrap().as_deref(), Some("v2"));

        let now = now_unix();
        assert!(!mem.before(now + 50).await.unwrap().has_any());
        let due = mem.before(now + 100).await.unwrap();
        assert_eq!(due.entries.get("k").map(String::as_str), Some("v2"));
    }

    #[tokio::test]
    async fn test_relocation_keeps_shared_bucket() {
        let mem = provider();
        mem.set("a", "A", 5).await.unwrap();
        mem.set("b", "B", 5).await.unwrap();
        mem.set("a", "A2", 100).await.unwrap();

        // "b" may share the 5s bucket with the old "a" or not, depending on
        // the second boundary, but the old "a" must be gone from it.
        let due = mem.before(now_unix() + 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due.entries.get("b").map(String::as_str), Some("B"));
        assert_eq!(mem.bucket_count(), 2);
    }

    #[tokio::test]
    async fn test_before_aggregates_due_keys() {
        let mem = provider();
        mem.set("a", "A", 5).await.unwrap();
        mem.set("b", "B", 5).await.unwrap();
        let now = now_unix();

        let due = mem.before(now + 5).await.unwrap();
        assert!(due.has_any());
        assert_eq!(due.len(), 2);
        assert_eq!(due.entries.get("a").map(String::as_str), Some("A"));
        assert_eq!(due.entries.get("b").map(String::as_str), Some("B"));
        assert!(due.buckets.iter().all(|b| b.starts_with("Test:")));

        assert!(!mem.before(now).await.unwrap().has_any());
    }

    #[tokio::test]
    async fn test_before_has_no_side_effects() {
        let mem = provider();
        mem.set("a", "A", 1).await.unwrap();
        let threshold = now_unix() + 1;

        let first = mem.before(threshold).await.unwrap();
        let second = mem.before(threshold).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mem.len(), 1);
    }

    #[tokio::test]
    async fn test_del_is_idempotent() {
        let mem = provider();
        mem.set("k", "v", 5).await.unwrap();

        mem.del("k").await.unwrap();
        assert_eq!(mem.get("k").await.unwrap(), None);
        mem.del("k").await.unwrap();
        assert_eq!(mem.get("k").await.unwrap(), None);
        assert!(mem.is_empty());
        assert_eq!(mem.bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_non_positive_ttl_is_due_now() {
        let mem = provider();
        mem.set("zero", "0", 0).await.unwrap();
        mem.set("past", "-", -30).await.unwrap();

        let due = mem.before(now_unix()).await.unwrap();
        assert_eq!(due.len(), 2);
    }

    #[tokio::test]
    async fn test_bucket_order_across_digit_boundary() {
        let mem = provider();
        // A deadline far in the future has more digits than one near now;
        // it must not be reported as due.
        mem.set("soon", "s", 1).await.unwrap();
        mem.set("far", "f", 9_000_000_000).await.unwrap();

        let due = mem.before(now_unix() + 1).await.unwrap();
        assert_eq!(due.len(), 1);
        assert!(due.entries.contains_key("soon"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_indices_consistent() {
        let mem = Arc::new(provider());

        let mut handles = Vec::new();
        for task in 0..8 {
            let mem = Arc::clone(&mem);
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    let key = format!("key:{}", i % 50);
                    let ttl = ((task * 200 + i) % 7) as i64 + 1;
                    mem.set(&key, &format!("{}:{}", task, i), ttl).await.unwrap();
                    if i % 5 == 0 {
                        mem.del(&key).await.unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every live key appears in exactly one bucket and every bucket
        // member is live.
        let index = mem.index.read().unwrap();
        let members: usize = index.buckets.values().map(VecDeque::len).sum();
        assert_eq!(members, index.entries.len());
        for (deadline, keys) in index.buckets.iter() {
            assert!(!keys.is_empty());
            for key in keys {
                let entry = index.entries.get(key).unwrap();
                assert_eq!(entry.deadline(), Some(*deadline));
            }
        }
    }
}
