//! Fault-Injecting Substrate
//!
//! Wraps a [`MemoryBackend`] so tests can make chosen commands fail, or
//! slip writes in just before a command runs to stand in for a
//! concurrent client.

use crate::backend::{Backend, MemoryBackend};
use crate::error::{Result, TimerError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub(crate) struct FaultyBackend {
    inner: MemoryBackend,
    failing: Mutex<HashSet<&'static str>>,
    injected: Mutex<HashMap<&'static str, Vec<(String, String)>>>,
}

impl FaultyBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Makes every `op` call fail until [`recover`](Self::recover).
    pub(crate) fn fail_on(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub(crate) fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Applies `writes` once, right before the next `op` call.
    pub(crate) fn write_before(&self, op: &'static str, writes: Vec<(String, String)>) {
        self.injected.lock().unwrap().insert(op, writes);
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(TimerError::Backend(format!("{} unavailable", op)));
        }
        let writes = self.injected.lock().unwrap().remove(op).unwrap_or_default();
        for (key, value) in writes {
            self.inner.set(&key, &value).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FaultyBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.enter("get").await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.enter("set").await?;
        self.inner.set(key, value).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.enter("del").await?;
        self.inner.del(key).await
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()> {
        self.enter("zadd").await?;
        self.inner.zadd(key, score, member).await
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.enter("zrange").await?;
        self.inner.zrange(key, start, stop).await
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<()> {
        self.enter("zrem").await?;
        self.inner.zrem(key, members).await
    }
}
