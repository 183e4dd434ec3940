//! Line framing for [`Message`]
//!
//! Wraps tokio-util's `LinesCodec`. Over-long lines and lines that are not
//! valid UTF-8 are dropped with a warning and the stream keeps going.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::error::AppError;
use crate::message::{Message, MAX_LINE};

/// Codec turning socket bytes into [`Message`]s and back
#[derive(Debug)]
pub struct MessageCodec {
    lines: LinesCodec,
    skip_blank: bool,
}

impl MessageCodec {
    /// Server side: blank lines are delivered and decode to type 0
    pub fn server() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE),
            skip_blank: false,
        }
    }

    /// Client side: blank lines are discarded before decoding
    pub fn client() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE),
            skip_blank: true,
        }
    }

    fn accept(&self, line: String) -> Option<Message> {
        if self.skip_blank && line.is_empty() {
            None
        } else {
            Some(Message::decode(&line))
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, AppError> {
        loop {
            match self.lines.decode(src) {
                Ok(Some(line)) => {
                    if let Some(msg) = self.accept(line) {
                        return Ok(Some(msg));
                    }
                }
                Ok(None) => return Ok(None),
                Err(err) => recover(err)?,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, AppError> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) => {
                    if let Some(msg) = self.accept(line) {
                        return Ok(Some(msg));
                    }
                }
                Ok(None) => return Ok(None),
                Err(err) => recover(err)?,
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = AppError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), AppError> {
        dst.extend_from_slice(msg.encode().as_bytes());
        Ok(())
    }
}

// Malformed lines are skipped; only real I/O failures end the stream.
fn recover(err: LinesCodecError) -> Result<(), AppError> {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            warn!("Dropping line longer than {} bytes", MAX_LINE);
            Ok(())
        }
        LinesCodecError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            warn!("Dropping line that is not valid UTF-8");
            Ok(())
        }
        LinesCodecError::Io(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    #[test]
    fn test_server_keeps_blank_lines() {
        let mut codec = MessageCodec::server();
        let mut buf = BytesMut::from("\n12:0:a:\n");
        let blank = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(blank.kind, MessageType::Unknown(0));
        let query = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(query.kind, MessageType::Query);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_client_skips_blank_lines() {
        let mut codec = MessageCodec::client();
        let mut buf = BytesMut::from("\n\n2:0::\n");
        let ack = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(ack.kind, MessageType::LoginAck);
    }

    #[test]
    fn test_partial_line_waits() {
        let mut codec = MessageCodec::server();
        let mut buf = BytesMut::from("11:2:b:h");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"i\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.data, "hi");
    }

    #[test]
    fn test_overlong_line_is_dropped() {
        let mut codec = MessageCodec::server();
        let mut buf = BytesMut::new();
        buf.extend_from_slice("x".repeat(MAX_LINE + 10).as_bytes());
        buf.extend_from_slice(b"\n12:0:a:\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.kind, MessageType::Query);
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let mut codec = MessageCodec::server();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"11:1:a:\xff\xfe\n14:0:a:\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.kind, MessageType::Quit);
    }

    #[test]
    fn test_trailing_line_at_eof() {
        let mut codec = MessageCodec::server();
        let mut buf = BytesMut::from("14:0:a:");
        let msg = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(msg.kind, MessageType::Quit);
    }

    #[test]
    fn test_encode_appends_terminator() {
        let mut codec = MessageCodec::client();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::request(MessageType::Join, "a", "lobby"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"5:5:a:lobby\n");
    }
}
