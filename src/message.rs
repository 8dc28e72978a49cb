//! Messages exchanged with the service, and close codes.

use crate::protocol::{Frame, OpCode};

/// WebSocket close status code (RFC 6455 Section 7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001).
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Invalid payload (1007).
    InvalidPayload,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1007 => CloseCode::InvalidPayload,
            other => CloseCode::Other(other),
        }
    }

    /// Get the numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::InvalidPayload => 1007,
            CloseCode::Other(code) => *code,
        }
    }

    /// Reserved codes (1004-1006, 1015) MUST NOT be sent in a Close frame.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

/// Close frame containing status code and optional reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close status code.
    pub code: CloseCode,
    /// Human-readable reason for closing.
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame with the given code and reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a close payload. An empty payload carries no status.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [] => None,
            [hi, lo, reason @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                match std::str::from_utf8(reason) {
                    Ok(reason) => Some(CloseFrame::new(CloseCode::from_u16(code), reason)),
                    Err(_) => Some(CloseFrame::new(CloseCode::InvalidPayload, "")),
                }
            }
            [_] => Some(CloseFrame::new(
                CloseCode::ProtocolError,
                "Invalid close frame",
            )),
        }
    }
}

/// A complete message. Requests and responses are `Text`; the rest is
/// connection upkeep.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// `None` when the peer sent no status.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Create a close message with status code and reason.
    #[must_use]
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Message::Close(Some(CloseFrame::new(code, reason)))
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(s) => Frame::new(true, OpCode::Text, s.into_bytes()),
            Message::Binary(d) => Frame::new(true, OpCode::Binary, d),
            Message::Ping(d) => Frame::ping(d),
            Message::Pong(d) => Frame::pong(d),
            Message::Close(None) => Frame::close(None, ""),
            Message::Close(Some(cf)) => Frame::close(Some(cf.code.as_u16()), &cf.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_roundtrip_known() {
        for code in [1000u16, 1001, 1002, 1007] {
            assert_eq!(CloseCode::from_u16(code).as_u16(), code);
        }
        assert_eq!(CloseCode::from_u16(1011), CloseCode::Other(1011));
        assert_eq!(CloseCode::from_u16(4000), CloseCode::Other(4000));
    }

    #[test]
    fn test_close_code_reserved() {
        assert!(CloseCode::Other(1005).is_reserved());
        assert!(CloseCode::Other(1015).is_reserved());
        assert!(!CloseCode::Normal.is_reserved());
    }

    #[test]
    fn test_close_frame_from_payload() {
        assert_eq!(CloseFrame::from_payload(&[]), None);

        let cf = CloseFrame::from_payload(&[0x03, 0xe8, b'b', b'y', b'e']).unwrap();
        assert_eq!(cf.code, CloseCode::Normal);
        assert_eq!(cf.reason, "bye");

        let cf = CloseFrame::from_payload(&[0x03]).unwrap();
        assert_eq!(cf.code, CloseCode::ProtocolError);

        let cf = CloseFrame::from_payload(&[0x03, 0xe8, 0xff]).unwrap();
        assert_eq!(cf.code, CloseCode::InvalidPayload);
    }

    #[test]
    fn test_message_into_frame() {
        let frame = Frame::from(Message::text("hi"));
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"hi");

        let frame = Frame::from(Message::close(CloseCode::Normal, "done"));
        assert_eq!(frame.opcode, OpCode::Close);
        assert_eq!(&frame.payload()[..2], &[0x03, 0xe8]);
        assert_eq!(&frame.payload()[2..], b"done");
    }
}
