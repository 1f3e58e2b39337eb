//! A tokio codec framing [`Message`]s as CRLF-terminated lines.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{EncodeError, ProtocolError};
use crate::message::{Message, MAX_LINE_LEN};

/// Splits the byte stream on '\n' and parses each line as a [`Message`].
///
/// Lines longer than the limit are a protocol error, as is any line
/// that fails to parse. Both are fatal to the connection; the caller is
/// expected to drop the peer.
#[derive(Debug)]
pub struct LineCodec {
    // Offset into the buffer already scanned for '\n'.
    next_index: usize,
    max_len: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: MAX_LINE_LEN,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if line.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }
            let text = String::from_utf8_lossy(&line);
            match text.parse::<Message>() {
                Ok(message) => Ok(Some(message)),
                Err(cause) => Err(ProtocolError::InvalidMessage {
                    string: text.trim_end().to_string(),
                    cause,
                }),
            }
        } else {
            self.next_index = src.len();
            if src.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }
            Ok(None)
        }
    }
}

impl Encoder<Message> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match message.encode() {
            Ok(line) => {
                dst.extend_from_slice(line.as_bytes());
                Ok(())
            }
            // A truncated line is still well formed; send what fits.
            Err(EncodeError::Truncated { line }) => {
                dst.extend_from_slice(line.as_bytes());
                Ok(())
            }
            Err(e) => Err(ProtocolError::Encode(e)),
        }
    }
}
