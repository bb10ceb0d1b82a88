//! Newline framing for the text protocol.
//!
//! TCP hands us an arbitrary chunking of the byte stream: one read can hold
//! half a line, exactly one line, or several lines plus the start of the next
//! one. [`LineCodec`] keeps whatever has not been terminated yet in the
//! framed reader's buffer and only yields complete lines.
//!
//! A malformed line is yielded as `Some(Err(FramingError))` rather than as a
//! decoder error, because `FramedRead` stops the stream after the first
//! decoder error and a single bad line must not cost the connection.

use crate::{FramingError, Message, LINE_TERMINATOR, MAX_LINE_LENGTH};
use bytes::{BufMut, BytesMut};
use log::debug;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Line-based codec for [`Message`].
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Where to resume scanning for the terminator in the buffered bytes
    next_index: usize,
    /// Set while skipping the rest of an over-long line
    discarding: bool,
    max_length: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            discarding: false,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Result<Message, FramingError>;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, io::Error> {
        loop {
            let terminator = buf[self.next_index..]
                .iter()
                .position(|b| *b == LINE_TERMINATOR)
                .map(|offset| self.next_index + offset);

            match terminator {
                Some(end) => {
                    let line = buf.split_to(end + 1);
                    self.next_index = 0;

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }

                    let line = &line[..end];
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    if line.len() > self.max_length {
                        return Ok(Some(Err(FramingError::LineTooLong {
                            limit: self.max_length,
                        })));
                    }
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Ok(Some(parse_frame(line)));
                }
                // A trailing '\r' may still turn out to be half of a CRLF
                None if buf.len() > self.max_length + usize::from(buf.last() == Some(&b'\r')) => {
                    buf.clear();
                    self.next_index = 0;
                    if self.discarding {
                        return Ok(None);
                    }
                    self.discarding = true;
                    return Ok(Some(Err(FramingError::LineTooLong {
                        limit: self.max_length,
                    })));
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if !buf.is_empty() {
            debug!("Discarding {} bytes of unterminated input", buf.len());
            buf.clear();
        }
        self.next_index = 0;
        self.discarding = false;
        Ok(None)
    }
}

impl Encoder<Message> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), io::Error> {
        encode_into(&message, dst);
        Ok(())
    }
}

impl Encoder<&Message> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), io::Error> {
        encode_into(message, dst);
        Ok(())
    }
}

/// Encodes one message as a terminated line.
pub fn encode(message: &Message) -> BytesMut {
    let mut dst = BytesMut::new();
    encode_into(message, &mut dst);
    dst
}

fn encode_into(message: &Message, dst: &mut BytesMut) {
    let line = message.to_line();
    dst.reserve(line.len() + 1);
    dst.put_slice(line.as_bytes());
    dst.put_u8(LINE_TERMINATOR);
}

fn parse_frame(line: &[u8]) -> Result<Message, FramingError> {
    let text = std::str::from_utf8(line).map_err(|_| FramingError::InvalidUtf8)?;
    Message::parse_line(text)
}
