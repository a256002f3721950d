//! Newline-delimited JSON framing.
//!
//! Every document is followed by a single `\n`. serde_json never emits a raw
//! newline inside a document, so the delimiter is unambiguous.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::message::HandlerMessage;

/// Message delimiter.
pub const DELIMITER: u8 = b'\n';

/// Codec for [`HandlerMessage`] frames.
///
/// A segment that is not valid JSON is logged and dropped; it does not end
/// the stream. A trailing partial segment stays buffered until its
/// delimiter arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandlerCodec;

impl HandlerCodec {
    /// Creates a codec.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for HandlerCodec {
    type Item = HandlerMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(pos) = src.iter().position(|b| *b == DELIMITER) {
            let frame = src.split_to(pos + 1);
            let line = &frame[..pos];
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<HandlerMessage>(line) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    warn!(
                        error = %e,
                        frame = %String::from_utf8_lossy(line),
                        "Discarding malformed message from hooks handler"
                    );
                }
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if src.has_remaining() {
            debug!(
                bytes = src.remaining(),
                "Discarding unterminated data from hooks handler"
            );
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<HandlerMessage> for HandlerCodec {
    type Error = io::Error;

    fn encode(&mut self, item: HandlerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        serde_json::to_writer(dst.writer(), &item)?;
        dst.put_u8(DELIMITER);
        Ok(())
    }
}
