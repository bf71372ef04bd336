//! Wire Protocol
//!
//! Requests are plain text, one command per line, tokens separated by
//! whitespace. Responses are typed, length-prefixed values.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Splits the incoming byte stream into lines
//!
//! ## Example
//!
//! ```ignore
//! use snapkv::protocol::{LineParser, RespValue};
//! use bytes::BytesMut;
//!
//! // Framing incoming data
//! let mut buffer = BytesMut::from(&b"GET name\r\n"[..]);
//! let line = LineParser::new().parse(&mut buffer)?;
//!
//! // Creating responses
//! let bytes = RespValue::bulk_string("snapkv").serialize();
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{LineParser, ParseError, ParseResult, MAX_LINE_SIZE};
pub use types::{ErrorKind, RespValue};
