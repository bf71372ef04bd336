//! Line Framing
//!
//! Clients send one command per line. TCP delivers a byte stream, so a single
//! read can hold half a line or several lines at once. The connection loop
//! appends whatever arrives to a `BytesMut` buffer and asks [`LineParser`]
//! for complete lines.
//!
//! The parser returns:
//! - `Ok(Some(line))` - a complete line, terminator stripped, bytes consumed
//! - `Ok(None)` - no complete line yet, read more
//! - `Err(ParseError::InvalidUtf8)` - the line was consumed but is not text
//! - `Err(ParseError::LineTooLong)` - the buffered line exceeds the limit

use bytes::BytesMut;
use thiserror::Error;

/// Errors that can occur during line framing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The line is not valid UTF-8 (the bad line has been consumed)
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// No line terminator within the size limit
    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size of a single command line (64 KB)
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Extracts newline-terminated lines from a byte buffer.
///
/// # Example
///
/// ```
/// use snapkv::protocol::LineParser;
/// use bytes::BytesMut;
///
/// let mut parser = LineParser::new();
/// let mut buffer = BytesMut::from(&b"SET name snapkv\r\nGET na"[..]);
///
/// assert_eq!(parser.parse(&mut buffer).unwrap(), Some("SET name snapkv".to_string()));
/// assert_eq!(parser.parse(&mut buffer).unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct LineParser {
    /// Bytes already searched for a terminator
    scanned: usize,
}

impl LineParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { scanned: 0 }
    }

    /// Attempts to take one complete line from the front of `buf`.
    pub fn parse(&mut self, buf: &mut BytesMut) -> ParseResult<Option<String>> {
        let start = self.scanned.min(buf.len());

        match buf[start..].iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let end = start + pos;
                self.scanned = 0;

                let mut line = buf.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }

                if line.len() > MAX_LINE_SIZE {
                    return Err(ParseError::LineTooLong {
                        size: line.len(),
                        max: MAX_LINE_SIZE,
                    });
                }
                decode(line).map(Some)
            }
            None => {
                self.scanned = buf.len();
                if buf.len() > MAX_LINE_SIZE {
                    return Err(ParseError::LineTooLong {
                        size: buf.len(),
                        max: MAX_LINE_SIZE,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Takes whatever is left in `buf` as a final, unterminated line.
    ///
    /// Used when the peer closes the stream without a trailing newline.
    pub fn finish(&mut self, buf: &mut BytesMut) -> ParseResult<Option<String>> {
        self.scanned = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let mut line = buf.split();
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        decode(line).map(Some)
    }
}

fn decode(line: BytesMut) -> ParseResult<String> {
    String::from_utf8(line.to_vec()).map_err(|e| ParseError::InvalidUtf8(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_line() {
        let mut parser = LineParser::new();
        let mut buf = BytesMut::from(&b"PING\n"[..]);

        assert_eq!(parser.parse(&mut buf).unwrap(), Some("PING".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_strips_crlf() {
        let mut parser = LineParser::new();
        let mut buf = BytesMut::from(&b"GET key\r\n"[..]);

        assert_eq!(parser.parse(&mut buf).unwrap(), Some("GET key".to_string()));
    }

    #[test]
    fn test_parse_incomplete_then_complete() {
        let mut parser = LineParser::new();
        let mut buf = BytesMut::from(&b"SET ke"[..]);

        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 6);

        buf.extend_from_slice(b"y value\r\n");
        assert_eq!(parser.parse(&mut buf).unwrap(), Some("SET key value".to_string()));
    }

    #[test]
    fn test_parse_pipelined_lines() {
        let mut parser = LineParser::new();
        let mut buf = BytesMut::from(&b"PING\r\nECHO hi\n\r\nGET"[..]);

        assert_eq!(parser.parse(&mut buf).unwrap(), Some("PING".to_string()));
        assert_eq!(parser.parse(&mut buf).unwrap(), Some("ECHO hi".to_string()));
        assert_eq!(parser.parse(&mut buf).unwrap(), Some(String::new()));
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"GET");
    }

    #[test]
    fn test_parse_invalid_utf8_consumes_line() {
        let mut parser = LineParser::new();
        let mut buf = BytesMut::from(&b"GET \xff\nPING\n"[..]);

        assert!(matches!(parser.parse(&mut buf), Err(ParseError::InvalidUtf8(_))));
        assert_eq!(parser.parse(&mut buf).unwrap(), Some("PING".to_string()));
    }

    #[test]
    fn test_parse_line_too_long() {
        let mut parser = LineParser::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_SIZE + 1].as_slice());

        assert!(matches!(
            parser.parse(&mut buf),
            Err(ParseError::LineTooLong { .. })
        ));
    }

    #[test]
    fn test_finish_takes_unterminated_tail() {
        let mut parser = LineParser::new();
        let mut buf = BytesMut::from(&b"PING"[..]);

        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        assert_eq!(parser.finish(&mut buf).unwrap(), Some("PING".to_string()));
        assert_eq!(parser.finish(&mut buf).unwrap(), None);
    }
}
