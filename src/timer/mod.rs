//! Timer Store
//!
//! [`TimerStore`] binds a registered provider to a prefix and runs the
//! sweep that turns due keys into callbacks.
//!
//! ```text
//!   caller ── set / get / del ──> TimerStore ──> Provider
//!                                                   ▲
//!   ┌───────────────────────────────────┐           │
//!   │ sweep task (every `interval`)     │           │
//!   │   before(now) ────────────────────┼───────────┤
//!   │   for each due key:               │           │
//!   │     handler(key, value)           │           │
//!   │     del(key) ─────────────────────┼───────────┤
//!   │   prune(buckets) ─────────────────┼───────────┘
//!   └───────────────────────────────────┘
//! ```
//!
//! The handler runs on Tokio's blocking pool, never on the caller's path.
//! Background sweeps and [`TimerStore::sweep_once`] take turns on one
//! lock, so two sweeps never overlap.

pub mod store;

pub use store::{Handler, TimerStore};
