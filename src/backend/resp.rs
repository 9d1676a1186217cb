//! RESP Network Substrate
//!
//! A [`Backend`] that speaks RESP to a Redis-compatible server over one
//! TCP connection. Commands are serialized through a mutex, so a single
//! request/reply pair is in flight at a time.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! call() ──> take connection ──(none)──> connect + AUTH
//!                 │
//!                 ▼
//!          write command, read reply
//!                 │
//!        ┌────────┴─────────┐
//!     success            I/O or parse error
//!        │                  │
//!   put connection back   drop it, next call reconnects
//! ```

use crate::backend::Backend;
use crate::config::BackendConfig;
use crate::error::{Result, TimerError};
use crate::protocol::{RespParser, RespValue};
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// One open connection with its read buffer.
struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
}

impl Connection {
    async fn open(config: &BackendConfig) -> Result<Self> {
        let address = config.address();
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out", address),
                )
            })??;
        stream.set_nodelay(true)?;
        debug!(address = %address, "Connected to shared store");

        let mut conn = Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
        };

        if let Some(password) = &config.password {
            let reply = conn.request(&RespValue::command(["AUTH", password.as_str()])).await?;
            expect_ok("AUTH", reply)?;
        }

        Ok(conn)
    }

    async fn request(&mut self, command: &RespValue) -> Result<RespValue> {
        let bytes = command.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(bytes = bytes.len(), "Sent command");

        loop {
            if let Some((reply, consumed)) = self.parser.parse(&self.buffer)? {
                let _ = self.buffer.split_to(consumed);
                return Ok(reply);
            }

            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "shared store closed the connection",
                )
                .into());
            }
            trace!(bytes = n, "Read reply data");
        }
    }
}

/// Client for a Redis-compatible server.
///
/// # Example
///
/// ```no_run
/// use timerstore::backend::{Backend, RespBackend};
/// use timerstore::config::BackendConfig;
///
/// # async fn demo() -> timerstore::Result<()> {
/// let backend = RespBackend::connect(BackendConfig::new("127.0.0.1", 6379)).await?;
/// backend.set("greeting", "hello").await?;
/// assert_eq!(backend.get("greeting").await?.as_deref(), Some("hello"));
/// # Ok(())
/// # }
/// ```
pub struct RespBackend {
    config: BackendConfig,
    conn: Mutex<Option<Connection>>,
}

impl RespBackend {
    /// Creates a client that connects on first use.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Creates a client and verifies the server answers `PING`.
    pub async fn connect(config: BackendConfig) -> Result<Self> {
        let backend = Self::new(config);
        backend.ping().await?;
        Ok(backend)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub async fn ping(&self) -> Result<()> {
        match self.call(&["PING"]).await? {
            RespValue::SimpleString(s) if s == "PONG" => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    /// Sends one command and returns its reply. Error replies become
    /// [`TimerError::Backend`].
    async fn call(&self, args: &[&str]) -> Result<RespValue> {
        let command = RespValue::command(args.iter().copied());
        let mut guard = self.conn.lock().await;

        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => Connection::open(&self.config).await?,
        };

        // A failed round trip leaves the stream in an unknown state, so the
        // connection is only returned to the slot on success.
        let reply = conn.request(&command).await?;
        *guard = Some(conn);

        match reply {
            RespValue::Error(msg) => Err(TimerError::Backend(msg)),
            reply => Ok(reply),
        }
    }
}

#[async_trait]
impl Backend for RespBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.call(&["GET", key]).await? {
            RespValue::Null => Ok(None),
            RespValue::BulkString(data) => String::from_utf8(data.to_vec())
                .map(Some)
                .map_err(|_| TimerError::Backend(format!("value at {} is not UTF-8", key))),
            other => Err(unexpected("GET", &other)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        expect_ok("SET", self.call(&["SET", key, value]).await?)
    }

    async fn del(&self, key: &str) -> Result<()> {
        expect_integer("DEL", self.call(&["DEL", key]).await?)
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()> {
        let score = score.to_string();
        expect_integer("ZADD", self.call(&["ZADD", key, &score, member]).await?)
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        let reply = self.call(&["ZRANGE", key, &start, &stop]).await?;

        let items = match reply {
            RespValue::Null => return Ok(Vec::new()),
            RespValue::Array(items) => items,
            other => return Err(unexpected("ZRANGE", &other)),
        };

        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| unexpected("ZRANGE", item))
            })
            .collect()
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut args = Vec::with_capacity(members.len() + 2);
        args.push("ZREM");
        args.push(key);
        args.extend(members.iter().map(String::as_str));
        expect_integer("ZREM", self.call(&args).await?)
    }
}

fn expect_ok(command: &str, reply: RespValue) -> Result<()> {
    match reply {
        RespValue::SimpleString(s) if s == "OK" => Ok(()),
        RespValue::Error(msg) => Err(TimerError::Backend(msg)),
        other => Err(unexpected(command, &other)),
    }
}

fn expect_integer(command: &str, reply: RespValue) -> Result<()> {
    match reply {
        RespValue::Integer(_) => Ok(()),
        other => Err(unexpected(command, &other)),
    }
}

fn unexpected(command: &str, reply: &RespValue) -> TimerError {
    TimerError::Backend(format!("unexpected {} reply: {:?}", command, reply))
}
