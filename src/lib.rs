//! # timerstore - A TTL Keyed Store with Expiry Callbacks
//!
//! Set a value under a key with a time-to-live, read it back by key, and
//! get called back exactly once when the TTL elapses, after which the key
//! is purged.
//!
//! ## Features
//!
//! - **Expiry-Indexed Storage**: keys are grouped into one-second deadline
//!   buckets, so finding due keys never scans the whole key space
//! - **Two Providers**: an in-process store, and a shared-store layout over
//!   any Redis-compatible server
//! - **Background Sweep**: a cancellable Tokio task delivers due keys to
//!   your handler
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            TimerStore                               │
//! │   set / get / del ─────────────┐        sweep task ──> handler      │
//! └────────────────────────────────┼──────────────┬─────────────────────┘
//!                                  ▼              ▼
//!                        ┌──────────────────────────────┐
//!                        │       dyn Provider           │  <── Registry
//!                        └───────┬──────────────┬───────┘
//!                                │              │
//!                       ┌────────▼─────┐ ┌──────▼──────────────┐
//!                       │ MemProvider  │ │ SharedProvider<B>   │
//!                       │ RwLock maps  │ │ record/bucket/index │
//!                       └──────────────┘ └──────┬──────────────┘
//!                                               │ Backend
//!                                  ┌────────────┴───────────┐
//!                                  ▼                        ▼
//!                           MemoryBackend            RespBackend ── TCP
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use timerstore::{MemProvider, Registry, TimerStore};
//!
//! #[tokio::main]
//! async fn main() -> timerstore::Result<()> {
//!     let registry = Registry::new();
//!     registry.register("mem", Arc::new(MemProvider::new()))?;
//!
//!     let timers = TimerStore::new(&registry, "sessions", "mem", Duration::from_secs(1), |key, value| {
//!         println!("session {} expired ({})", key, value);
//!     })?;
//!
//!     timers.set("user:42", "token-abc", 30).await?;
//!     assert_eq!(timers.get("user:42").await?.as_deref(), Some("token-abc"));
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`provider`]: the storage contract, both providers and the registry
//! - [`timer`]: the timer store and its sweep task
//! - [`backend`]: substrates for the shared provider
//! - [`protocol`]: RESP codec used by the network substrate
//! - [`config`]: configuration structs
//! - [`error`]: error type

pub mod backend;
pub mod config;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod timer;

// Re-export commonly used types for convenience
pub use backend::{Backend, MemoryBackend, RespBackend};
pub use config::{BackendConfig, SharedConfig, SweepConfig};
pub use error::{Result, TimerError};
pub use provider::{Due, Entry, MemProvider, Provider, Registry, SharedProvider};
pub use timer::{Handler, TimerStore};

/// Version of timerstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
