//! Tokio codec for newline-terminated ASCII integers.
//!
//! The microcontroller firmware prints one integer per line (`"4\r\n"` or
//! `"4\n"`). `IntLineCodec` implements [`Decoder`] and [`Encoder`] so the same
//! framing serves both a `Framed` async stream and the synchronous serial
//! adapter, which feeds its read buffer to [`Decoder::decode`] directly.
//!
//! # Framing Rules
//!
//! - A frame ends at `\n`; a trailing `\r` and surrounding spaces are ignored.
//! - Blank lines are skipped.
//! - A line that is not an integer is consumed and reported as
//!   `Error::InvalidLine`, so the next call resumes at the following line.
//! - A buffer that grows past the maximum line length without a newline is
//!   discarded and reported as `Error::LineTooLong`.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::{Decoder, Encoder};
//! use gondola_protocol::IntLineCodec;
//!
//! let mut codec = IntLineCodec::new();
//! let mut buffer = BytesMut::from(&b"4\r\n6\n"[..]);
//!
//! assert_eq!(codec.decode(&mut buffer).unwrap(), Some(4));
//! assert_eq!(codec.decode(&mut buffer).unwrap(), Some(6));
//! assert_eq!(codec.decode(&mut buffer).unwrap(), None);
//!
//! let mut out = BytesMut::new();
//! codec.encode(73, &mut out).unwrap();
//! assert_eq!(&out[..], b"73\n");
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::HostCommand;
use gondola_core::constants::MAX_LINE_LENGTH;
use gondola_core::{Error, Result};

/// Codec for the integer line protocol.
#[derive(Debug, Clone)]
pub struct IntLineCodec {
    /// Longest accepted line, excluding the terminator.
    max_line_length: usize,

    /// Bytes already scanned for a newline in the current buffer.
    next_index: usize,
}

impl IntLineCodec {
    /// Create a codec with the default maximum line length.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom maximum line length.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
        }
    }

    /// Get the current maximum line length.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }
}

impl Default for IntLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one line without its terminator.
fn parse_line(line: &[u8]) -> Result<Option<i64>> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i64>()
        .map(Some)
        .map_err(|_| Error::InvalidLine(trimmed.to_string()))
}

impl Decoder for IntLineCodec {
    type Item = i64;
    type Error = Error;

    /// Decode the next integer from the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` - A complete line held an integer
    /// - `Ok(None)` - No complete line yet
    /// - `Err(Error)` - The consumed line was garbage or the buffer overflowed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<i64>> {
        loop {
            let start = self.next_index.min(src.len());
            let newline = src[start..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| start + offset);

            let Some(end) = newline else {
                if src.len() > self.max_line_length {
                    let size = src.len();
                    src.clear();
                    self.next_index = 0;
                    return Err(Error::LineTooLong {
                        size,
                        max_size: self.max_line_length,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let line = src.split_to(end + 1);
            self.next_index = 0;

            match parse_line(&line[..end])? {
                Some(value) => {
                    trace!("Decoded serial value {}", value);
                    return Ok(Some(value));
                }
                // Blank line, keep scanning
                None => continue,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<i64>> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Unterminated last line
        let rest = src.split_to(src.len());
        self.next_index = 0;
        parse_line(&rest[..])
    }
}

impl Encoder<i64> for IntLineCodec {
    type Error = Error;

    fn encode(&mut self, item: i64, dst: &mut BytesMut) -> Result<()> {
        let line = format!("{item}\n");
        dst.reserve(line.len());
        dst.extend_from_slice(line.as_bytes());
        Ok(())
    }
}

impl Encoder<HostCommand> for IntLineCodec {
    type Error = Error;

    fn encode(&mut self, item: HostCommand, dst: &mut BytesMut) -> Result<()> {
        Encoder::<i64>::encode(self, item.code(), dst)
    }
}
