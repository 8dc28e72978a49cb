//! WebSocket frame parsing and serialization (RFC 6455).

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Decoded fixed part of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// FIN bit.
    pub fin: bool,
    /// RSV1 bit.
    pub rsv1: bool,
    /// RSV2 bit.
    pub rsv2: bool,
    /// RSV3 bit.
    pub rsv3: bool,
    /// Raw opcode nibble.
    pub opcode: u8,
    /// Masking key, when the MASK bit is set.
    pub mask: Option<[u8; 4]>,
    /// Payload length in bytes.
    pub payload_len: usize,
    /// Header length including extended length and masking key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Decode a header from the start of `buf`.
    ///
    /// The opcode is not interpreted here so that callers can run size and
    /// masking checks before rejecting unknown opcodes.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - `Error::PayloadTooLargeForPlatform` if the length does not fit `usize`
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let [byte0, byte1, rest @ ..] = buf else {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        };

        let masked = byte1 & 0x80 != 0;
        let (payload_len, len_size) = match byte1 & 0x7F {
            126 => {
                let [a, b, ..] = rest else {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                };
                (usize::from(u16::from_be_bytes([*a, *b])), 2)
            }
            127 => {
                let Some(bytes) = rest.get(..8) else {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                };
                let mut len = [0u8; 8];
                len.copy_from_slice(bytes);
                let len = u64::from_be_bytes(len);
                let len = usize::try_from(len)
                    .map_err(|_| Error::PayloadTooLargeForPlatform { size: len })?;
                (len, 8)
            }
            small => (usize::from(small), 0),
        };

        let mask_offset = 2 + len_size;
        let header_len = if masked { mask_offset + 4 } else { mask_offset };
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }

        let mask = masked.then(|| {
            [
                buf[mask_offset],
                buf[mask_offset + 1],
                buf[mask_offset + 2],
                buf[mask_offset + 3],
            ]
        });

        Ok(Self {
            fin: byte0 & 0x80 != 0,
            rsv1: byte0 & 0x40 != 0,
            rsv2: byte0 & 0x20 != 0,
            rsv3: byte0 & 0x10 != 0,
            opcode: byte0 & 0x0F,
            mask,
            payload_len,
            header_len,
        })
    }
}

/// A WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                 Masking key (if present)                      |
/// +---------------------------------------------------------------+
/// |                     Payload data                              |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 without a negotiated extension.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload,
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse a frame from a buffer, unmasking the payload if needed.
    ///
    /// Returns the parsed frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - `Error::InvalidOpcode` / `Error::ReservedOpcode` for unknown opcodes
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;
        let opcode = OpCode::try_from(header.opcode)?;

        let total = header
            .header_len
            .checked_add(header.payload_len)
            .ok_or(Error::PayloadTooLargeForPlatform {
                size: header.payload_len as u64,
            })?;
        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        let frame = Frame {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode,
            payload,
        };
        Ok((frame, total))
    }

    /// Validate the frame.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if RSV bits are set
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control payload exceeds 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }

        Ok(())
    }

    /// Append the wire form of this frame to `buf`.
    ///
    /// `mask` is required for frames sent by a client.
    pub fn write(&self, buf: &mut Vec<u8>, mask: Option<[u8; 4]>) {
        let len = self.payload.len();

        let mut byte0 = u8::from(self.opcode);
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf.push(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0 };
        match u16::try_from(len) {
            Ok(short) if short <= 125 => buf.push(mask_bit | short as u8),
            Ok(medium) => {
                buf.push(mask_bit | 126);
                buf.extend_from_slice(&medium.to_be_bytes());
            }
            Err(_) => {
                buf.push(mask_bit | 127);
                buf.extend_from_slice(&(len as u64).to_be_bytes());
            }
        }

        if let Some(key) = mask {
            buf.extend_from_slice(&key);
        }
        let start = buf.len();
        buf.extend_from_slice(&self.payload);
        if let Some(key) = mask {
            apply_mask(&mut buf[start..], key);
        }
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let extended = match len {
            0..=125 => 0,
            126..=65535 => 2,
            _ => 8,
        };
        let mask = if masked { 4 } else { 0 };
        2 + extended + mask + len
    }
}
