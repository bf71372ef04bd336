//! Wire Response Types
//!
//! Every command returns exactly one [`RespValue`], and the connection loop
//! serializes it the same way whether it is a result or an error.
//!
//! ## Wire Format
//!
//! Each value starts with a type prefix byte and every line ends with CRLF:
//! - `$` Bulk String: `$<byte length>\r\n<data>\r\n`, null is `$-1\r\n`
//! - `*` Array: `*<count>\r\n` followed by each element
//! - `-` Error: `-<kind> <message>\r\n`
//!
//! ## Examples
//!
//! Bulk String: `$4\r\nPONG\r\n`
//! Null Bulk String: `$-1\r\n`
//! Array: `*2\r\n$1\r\na\r\n$1\r\nb\r\n`
//! Error: `-ERR ILLEGAL ARGUMENT key required\r\n`

use bytes::{BufMut, BytesMut};

/// The CRLF terminator used on the wire
pub const CRLF: &[u8] = b"\r\n";

/// Type prefixes
pub mod prefix {
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// The kinds of error a client can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing command arguments
    IllegalArgument,
    /// No registered verb matched the line
    InvalidCommand,
    /// A snapshot did not carry the expected header
    Format,
    /// Anything not otherwise classified
    Unexpected,
}

impl ErrorKind {
    /// The token written after the `-` sigil.
    pub fn token(self) -> &'static str {
        match self {
            ErrorKind::IllegalArgument => "ERR ILLEGAL ARGUMENT",
            ErrorKind::InvalidCommand => "ERR INVALID COMMAND",
            ErrorKind::Format => "ERR FORMAT ERROR",
            ErrorKind::Unexpected => "ERR UNEXPECTED ERROR",
        }
    }
}

/// A value sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// A length-prefixed string, or the null bulk string when `None`.
    BulkString(Option<String>),

    /// An ordered list of values, serialized recursively.
    Array(Vec<RespValue>),

    /// A typed error, returned as a value like any other.
    Error(ErrorKind, String),
}

impl RespValue {
    /// Creates a bulk string response.
    ///
    /// # Example
    /// ```
    /// use snapkv::protocol::types::RespValue;
    /// let bulk = RespValue::bulk_string("hello");
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(s: impl Into<String>) -> Self {
        RespValue::BulkString(Some(s.into()))
    }

    /// Creates the null bulk string.
    pub fn null() -> Self {
        RespValue::BulkString(None)
    }

    /// Creates an array response.
    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Creates an error response.
    ///
    /// # Example
    /// ```
    /// use snapkv::protocol::types::{ErrorKind, RespValue};
    /// let err = RespValue::error(ErrorKind::InvalidCommand, "no such verb");
    /// assert_eq!(err.serialize(), b"-ERR INVALID COMMAND no such verb\r\n");
    /// ```
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        RespValue::Error(kind, message.into())
    }

    /// Common response for successful mutations
    pub fn ok() -> Self {
        RespValue::bulk_string("OK")
    }

    /// Common response for PING
    pub fn pong() -> Self {
        RespValue::bulk_string("PONG")
    }

    /// Serializes the value to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.to_vec()
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            RespValue::BulkString(Some(data)) => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(None) => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(b"-1");
                buf.put_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.put_u8(prefix::ARRAY);
                buf.put_slice(values.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
            RespValue::Error(kind, message) => {
                buf.put_u8(prefix::ERROR);
                buf.put_slice(kind.token().as_bytes());
                buf.put_u8(b' ');
                // Keep the error on one line
                for b in message.bytes() {
                    buf.put_u8(if b == b'\r' || b == b'\n' { b' ' } else { b });
                }
                buf.put_slice(CRLF);
            }
        }
    }

    /// Returns the error kind if this value is an error.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            RespValue::Error(kind, _) => Some(*kind),
            _ => None,
        }
    }

    /// Attempts to extract the inner string of a non-null bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::BulkString(Some(s)) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(values) => Some(values),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_string_serialize() {
        let value = RespValue::bulk_string("hello");
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_bulk_string_length_is_in_bytes() {
        let value = RespValue::bulk_string("é");
        assert_eq!(value.serialize(), "$2\r\né\r\n".as_bytes());
    }

    #[test]
    fn test_null_serialize() {
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_array_serialize() {
        let value = RespValue::array(vec![RespValue::bulk_string("a"), RespValue::bulk_string("b")]);
        assert_eq!(value.serialize(), b"*2\r\n$1\r\na\r\n$1\r\nb\r\n");
    }

    #[test]
    fn test_nested_array_serialize() {
        let value = RespValue::array(vec![
            RespValue::null(),
            RespValue::array(vec![RespValue::bulk_string("x")]),
            RespValue::array(vec![]),
        ]);
        assert_eq!(value.serialize(), b"*3\r\n$-1\r\n*1\r\n$1\r\nx\r\n*0\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = RespValue::error(ErrorKind::IllegalArgument, "key required");
        assert_eq!(value.serialize(), b"-ERR ILLEGAL ARGUMENT key required\r\n");

        let value = RespValue::error(ErrorKind::Unexpected, "line\r\nbreak");
        assert_eq!(value.serialize(), b"-ERR UNEXPECTED ERROR line  break\r\n");
    }

    #[test]
    fn test_ok_and_pong() {
        assert_eq!(RespValue::ok().serialize(), b"$2\r\nOK\r\n");
        assert_eq!(RespValue::pong().serialize(), b"$4\r\nPONG\r\n");
    }

    #[test]
    fn test_accessors() {
        assert_eq!(RespValue::bulk_string("v").as_str(), Some("v"));
        assert_eq!(
            RespValue::error(ErrorKind::Format, "bad").error_kind(),
            Some(ErrorKind::Format)
        );
        assert!(RespValue::array(vec![]).as_array().unwrap().is_empty());
    }
}
