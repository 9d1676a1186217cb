//! Configuration
//!
//! Plain structs with `Default` impls and `with_*` builders. Nothing here
//! reads files or the environment; the binary fills them from its
//! command line.

use std::time::Duration;

/// Default interval between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of index rows fetched per `before` round trip.
pub const DEFAULT_BATCH_SIZE: usize = 11;

/// Configuration for the timer store's sweep task.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time waited before each sweep (default: 1s)
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl SweepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interval between sweeps.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Configuration for [`SharedProvider`](crate::provider::SharedProvider).
#[derive(Debug, Clone)]
pub struct SharedConfig {
    /// Index rows fetched per round trip. A shorter batch ends the scan.
    pub batch_size: usize,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SharedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scan batch size. Zero is bumped to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Connection settings for [`RespBackend`](crate::backend::RespBackend).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Host of the Redis-compatible server
    pub host: String,
    /// Port of the Redis-compatible server
    pub port: u16,
    /// Sent with `AUTH` right after connecting, when set
    pub password: Option<String>,
    /// Upper bound on establishing the TCP connection
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl BackendConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
