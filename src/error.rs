//! Error Types
//!
//! Every fallible operation in the crate returns [`TimerError`]. A missing
//! key is never an error: lookups report absence through `Option`.

use crate::protocol::ParseError;
use thiserror::Error;

/// Errors produced by providers, backends and the registry.
#[derive(Debug, Error)]
pub enum TimerError {
    /// A provider name was registered twice
    #[error("duplicate registered provider: {0}")]
    Duplicate(String),

    /// A timer store was built against a name nobody registered
    #[error("provider is unknown: {0}")]
    UnknownProvider(String),

    /// Network or socket failure talking to the shared store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The shared store sent bytes that are not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The shared store answered with an error reply or an unexpected shape
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored record or membership list failed to decode
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, TimerError>;
