//! Incremental RESP Reply Parser
//!
//! Replies arrive over TCP in arbitrary chunks. The parser works on a
//! borrowed buffer and returns:
//!
//! - `Ok(Some((value, consumed)))` when a whole value is present
//! - `Ok(None)` when more bytes are needed
//! - `Err(ParseError)` when the bytes can never become valid RESP
//!
//! The caller advances its buffer by `consumed` and keeps the remainder.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding RESP.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Largest bulk string accepted (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted
pub const MAX_NESTING_DEPTH: usize = 32;

/// Reply parser. Holds only the nesting depth of the value in progress.
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&type_prefix) = buf.first() else {
            return Ok(None);
        };

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        // Every type starts with a header line right after the prefix.
        let Some((line, header_len)) = read_line(&buf[1..])? else {
            return Ok(None);
        };
        let header_len = header_len + 1;

        match type_prefix {
            prefix::SIMPLE_STRING => Ok(Some((RespValue::SimpleString(line.to_string()), header_len))),
            prefix::ERROR => Ok(Some((RespValue::Error(line.to_string()), header_len))),
            prefix::INTEGER => Ok(Some((RespValue::Integer(parse_int(line)?), header_len))),
            prefix::BULK_STRING => parse_bulk(buf, parse_int(line)?, header_len),
            prefix::ARRAY => self.parse_array(buf, parse_int(line)?, header_len),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    fn parse_array(
        &mut self,
        buf: &[u8],
        count: i64,
        header_len: usize,
    ) -> ParseResult<Option<(RespValue, usize)>> {
        if count == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        if count < 0 {
            return Err(ParseError::InvalidLength(count));
        }

        let mut elements = Vec::with_capacity((count as usize).min(1024));
        let mut consumed = header_len;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, used)) => {
                    elements.push(value);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

fn parse_bulk(buf: &[u8], length: i64, header_len: usize) -> ParseResult<Option<(RespValue, usize)>> {
    if length == -1 {
        return Ok(Some((RespValue::Null, header_len)));
    }
    if length < 0 {
        return Err(ParseError::InvalidLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total = header_len + length + CRLF.len();
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header_len + length..total] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
    Ok(Some((RespValue::BulkString(data), total)))
}

/// Reads one CRLF-terminated line. Returns the line and the bytes used
/// including the terminator.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let Some(pos) = buf.windows(2).position(|w| w == CRLF) else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buf[..pos]).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    Ok(Some((line, pos + CRLF.len())))
}

fn parse_int(line: &str) -> ParseResult<i64> {
    line.parse()
        .map_err(|_| ParseError::InvalidInteger(line.to_string()))
}

/// Parses a single value with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
