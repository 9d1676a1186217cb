//! RESP Wire Codec
//!
//! The shared-store backend talks to a Redis-compatible server over the
//! Redis Serialization Protocol. This module holds the client half of it:
//! encoding commands as arrays of bulk strings and decoding replies.
//!
//! ## Modules
//!
//! - `types`: The `RespValue` enum and its serialization
//! - `parser`: Incremental reply parser
//!
//! ## Example
//!
//! ```
//! use timerstore::protocol::{parse_message, RespValue};
//!
//! let request = RespValue::command(["GET", "jobs:first"]);
//! assert_eq!(request.serialize(), b"*2\r\n$3\r\nGET\r\n$10\r\njobs:first\r\n");
//!
//! let (reply, consumed) = parse_message(b"$-1\r\n").unwrap().unwrap();
//! assert!(reply.is_null());
//! assert_eq!(consumed, 5);
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
