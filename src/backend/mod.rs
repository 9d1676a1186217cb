//! Shared-Store Substrates
//!
//! [`SharedProvider`](crate::provider::SharedProvider) never talks to a
//! network client directly. It is written against [`Backend`], the narrow
//! slice of a Redis-like store it needs: flat string keys plus sorted sets.
//!
//! ```text
//! ┌──────────────────────────┐
//! │     SharedProvider<B>    │
//! └────────────┬─────────────┘
//!              │ get / set / del / zadd / zrange / zrem
//!      ┌───────┴────────┐
//!      ▼                ▼
//! ┌──────────────┐ ┌──────────────┐
//! │MemoryBackend │ │ RespBackend  │──── TCP ───> Redis-compatible server
//! └──────────────┘ └──────────────┘
//! ```

#[cfg(test)]
pub(crate) mod faulty;
pub mod memory;
pub mod resp;

pub use memory::MemoryBackend;
pub use resp::RespBackend;

use crate::error::Result;
use async_trait::async_trait;

/// The key-value and sorted-set operations a shared store must offer.
///
/// A missing key is `Ok(None)`, never an error. Keys written with
/// [`set`](Backend::set) carry no expiry of their own.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Reads a string key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a string key without expiry, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key of any type. Removing a missing key is not an error.
    async fn del(&self, key: &str) -> Result<()>;

    /// Adds `member` to the sorted set at `key`, or updates its score.
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()>;

    /// Returns members ranked `start..=stop` in ascending score order.
    /// Negative indices count from the end, as in Redis.
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Removes the given members from the sorted set at `key`.
    async fn zrem(&self, key: &str, members: &[String]) -> Result<()>;
}
