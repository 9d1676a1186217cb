//! Shared-Store Provider
//!
//! Lays the expiry index over a [`Backend`] that only offers string keys
//! and sorted sets. Three key spaces, all under the instance prefix:
//!
//! ```text
//! record   prefix:<key>       → {"bucket_key": "prefix:<deadline>", "value": ...}
//! bucket   prefix:<deadline>  → ["prefix:<key>", ...]        (JSON list)
//! index    prefix:index       → sorted set, score = deadline, member = bucket key
//! ```
//!
//! There is no cross-key transaction. `set` on an existing key unlinks
//! the old record before writing the new one, in separate round trips; a
//! failure in between can leave a bucket listing a key whose record now
//! points elsewhere. Scans ignore such members and `prune` clears them.
//!
//! `prune` rewrites membership lists too. It re-reads a list right before
//! writing it back and re-indexes any drained bucket that has members
//! again, but a `set` landing in a due bucket between that re-read and the
//! write can still lose its membership. Such a key keeps its value and is
//! never delivered until it is set again.
//!
//! User keys that parse as integers, or equal `index`, share a name with
//! the bucket or index keys of the same prefix and must be avoided.

use crate::backend::Backend;
use crate::config::SharedConfig;
use crate::error::Result;
use crate::provider::{bucket_deadline, bucket_key, deadline_after, Due, Entry, Provider};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Suffix of the sorted set indexing buckets by deadline
const INDEX_SUFFIX: &str = "index";

/// [`Provider`] over a shared key-value store.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use timerstore::backend::MemoryBackend;
/// use timerstore::provider::{Provider, SharedProvider};
///
/// # tokio_test::block_on(async {
/// let shared = SharedProvider::new(Arc::new(MemoryBackend::new()));
/// shared.set_prefix("jobs");
/// shared.set("report", "weekly", 30).await.unwrap();
/// assert_eq!(shared.get("report").await.unwrap().as_deref(), Some("weekly"));
/// # });
/// ```
pub struct SharedProvider<B: Backend> {
    backend: Arc<B>,
    prefix: RwLock<String>,
    config: SharedConfig,
}

impl<B: Backend> SharedProvider<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_config(backend, SharedConfig::default())
    }

    pub fn with_config(backend: Arc<B>, config: SharedConfig) -> Self {
        Self {
            backend,
            prefix: RwLock::new(String::new()),
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn prefix(&self) -> String {
        self.prefix.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix(), key)
    }

    fn index_key(&self) -> String {
        format!("{}:{}", self.prefix(), INDEX_SUFFIX)
    }

    /// Maps `prefix:key` back to `key`.
    fn user_key<'a>(&self, record_key: &'a str) -> Option<&'a str> {
        record_key
            .strip_prefix(self.prefix().as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }

    async fn load_entry(&self, record_key: &str) -> Result<Option<Entry>> {
        match self.backend.get(record_key).await? {
            Some(data) => Ok(Some(Entry::decode(&data)?)),
            None => Ok(None),
        }
    }

    async fn load_members(&self, bucket: &str) -> Result<Option<Vec<String>>> {
        match self.backend.get(bucket).await? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Writes a membership list back, deleting the bucket once empty.
    async fn store_members(&self, bucket: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            self.backend.del(bucket).await
        } else {
            self.backend.set(bucket, &serde_json::to_string(members)?).await
        }
    }
}

#[async_trait]
impl<B: Backend> Provider for SharedProvider<B> {
    fn set_prefix(&self, prefix: &str) {
        *self.prefix.write().unwrap_or_else(|e| e.into_inner()) = prefix.to_string();
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .load_entry(&self.record_key(key))
            .await?
            .map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: i64) -> Result<()> {
        let deadline = deadline_after(ttl);
        let bucket = bucket_key(&self.prefix(), deadline);
        let record_key = self.record_key(key);

        if self.backend.get(&record_key).await?.is_some() {
            self.del(key).await?;
        }

        let mut members = self.load_members(&bucket).await?.unwrap_or_default();
        members.push(record_key.clone());

        let record = Entry::new(bucket.clone(), value.to_string()).encode()?;
        self.backend.set(&record_key, &record).await?;
        self.backend
            .set(&bucket, &serde_json::to_string(&members)?)
            .await?;

        if let Err(e) = self.backend.zadd(&self.index_key(), deadline, &bucket).await {
            // A bucket with earlier members is already indexed.
            if members.len() == 1 {
                return Err(e);
            }
            debug!(bucket = %bucket, error = %e, "Re-adding indexed bucket failed");
        }

        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let record_key = self.record_key(key);
        let Some(entry) = self.load_entry(&record_key).await? else {
            return Ok(());
        };

        if let Some(mut members) = self.load_members(&entry.bucket_key).await? {
            if let Some(pos) = members.iter().position(|m| *m == record_key) {
                members.remove(pos);
            }
            self.store_members(&entry.bucket_key, &members).await?;
        }

        self.backend.del(&record_key).await
    }

    async fn before(&self, threshold: i64) -> Result<Due> {
        let index_key = self.index_key();
        let batch = self.config.batch_size as i64;

        let mut due = Due::default();
        let mut offset = 0i64;

        'scan: loop {
            let buckets = self
                .backend
                .zrange(&index_key, offset, offset + batch - 1)
                .await?;

            for bucket in &buckets {
                let Some(deadline) = bucket_deadline(bucket) else {
                    warn!(bucket = %bucket, "Skipping malformed bucket key in index");
                    continue;
                };
                // Ascending order: nothing after this can be due.
                if deadline > threshold {
                    break 'scan;
                }

                due.buckets.push(bucket.clone());
                let members = self.load_members(bucket).await?.unwrap_or_default();
                for record_key in &members {
                    let Some(key) = self.user_key(record_key) else {
                        continue;
                    };
                    // Only report a key from the bucket its record names.
                    if let Some(entry) = self.load_entry(record_key).await? {
                        if entry.bucket_key == *bucket {
                            due.entries.insert(key.to_string(), entry.value);
                        }
                    }
                }
            }

            if (buckets.len() as i64) < batch {
                break;
            }
            offset += batch;
        }

        Ok(due)
    }

    async fn prune(&self, buckets: &[String]) -> Result<()> {
        let index_key = self.index_key();
        let mut drained = Vec::new();

        for bucket in buckets {
            let Some(members) = self.load_members(bucket).await? else {
                drained.push(bucket.clone());
                continue;
            };

            let mut stale = Vec::new();
            for record_key in &members {
                let linked = match self.load_entry(record_key).await? {
                    Some(entry) => entry.bucket_key == *bucket,
                    None => false,
                };
                if !linked {
                    stale.push(record_key.clone());
                }
            }

            let live = if stale.is_empty() {
                members.len()
            } else {
                // Re-read so members appended since the first read survive.
                let mut current = self.load_members(bucket).await?.unwrap_or_default();
                current.retain(|m| !stale.contains(m));
                debug!(bucket = %bucket, stale = stale.len(), "Dropping stale bucket members");
                self.store_members(bucket, &current).await?;
                current.len()
            };
            if live == 0 {
                drained.push(bucket.clone());
            }
        }

        self.backend.zrem(&index_key, &drained).await?;

        // A concurrent set may have refilled a bucket after it was read.
        for bucket in &drained {
            if self.load_members(bucket).await?.is_some() {
                if let Some(deadline) = bucket_deadline(bucket) {
                    debug!(bucket = %bucket, "Re-indexing refilled bucket");
                    self.backend.zadd(&index_key, deadline, bucket).await?;
                }
            }
        }

        Ok(())
    }
}
