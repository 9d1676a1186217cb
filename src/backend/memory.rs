//! In-Process Substrate
//!
//! A [`Backend`] kept in process memory. It follows Redis semantics for
//! the commands it implements: sorted sets order by score then member,
//! `ZADD` on an existing member moves it, and an emptied sorted set
//! disappears. Useful for tests, demos and single-process deployments
//! that still want the shared provider's data model.

use crate::backend::Backend;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct SortedSet {
    /// Ordered by (score, member)
    ranked: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

impl SortedSet {
    fn add(&mut self, score: i64, member: &str) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ranked.remove(&(old, member.to_string()));
        }
        self.ranked.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) {
        if let Some(old) = self.scores.remove(member) {
            self.ranked.remove(&(old, member.to_string()));
        }
    }

    fn len(&self) -> usize {
        self.scores.len()
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    strings: HashMap<String, String>,
    sorted: HashMap<String, SortedSet>,
}

/// In-memory [`Backend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    keyspace: RwLock<Keyspace>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys of either type.
    pub fn len(&self) -> usize {
        let keyspace = self.keyspace.read().unwrap_or_else(|e| e.into_inner());
        keyspace.strings.len() + keyspace.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cardinality of the sorted set at `key` (0 when absent).
    pub fn zcard(&self, key: &str) -> usize {
        let keyspace = self.keyspace.read().unwrap_or_else(|e| e.into_inner());
        keyspace.sorted.get(key).map(SortedSet::len).unwrap_or(0)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let keyspace = self.keyspace.read().unwrap_or_else(|e| e.into_inner());
        Ok(keyspace.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut keyspace = self.keyspace.write().unwrap_or_else(|e| e.into_inner());
        keyspace.sorted.remove(key);
        keyspace.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut keyspace = self.keyspace.write().unwrap_or_else(|e| e.into_inner());
        keyspace.strings.remove(key);
        keyspace.sorted.remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()> {
        let mut keyspace = self.keyspace.write().unwrap_or_else(|e| e.into_inner());
        keyspace.strings.remove(key);
        keyspace
            .sorted
            .entry(key.to_string())
            .or_default()
            .add(score, member);
        Ok(())
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let keyspace = self.keyspace.read().unwrap_or_else(|e| e.into_inner());
        let Some(set) = keyspace.sorted.get(key) else {
            return Ok(Vec::new());
        };

        let len = set.len() as i64;

        // Convert negative indices
        let actual_start = if start < 0 { (len + start).max(0) } else { start };
        let actual_stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

        if actual_start > actual_stop || actual_start >= len {
            return Ok(Vec::new());
        }

        Ok(set
            .ranked
            .iter()
            .skip(actual_start as usize)
            .take((actual_stop - actual_start + 1) as usize)
            .map(|(_, member)| member.clone())
            .collect())
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<()> {
        let mut keyspace = self.keyspace.write().unwrap_or_else(|e| e.into_inner());
        if let Some(set) = keyspace.sorted.get_mut(key) {
            for member in members {
                set.remove(member);
            }
            if set.scores.is_empty() {
                keyspace.sorted.remove(key);
            }
        }
        Ok(())
    }
}
