//! Frame opcodes.

use crate::error::Error;

/// Low nibble of a frame's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum OpCode {
    Continuation = 0x0,
    /// Service requests and responses travel as text.
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    /// Answered with a pong by the connection itself.
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Close, Ping and Pong: final, short, and never fragmented.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    fn try_from(nibble: u8) -> Result<Self, Error> {
        Ok(match nibble {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            0x3..=0x7 | 0xB..=0xF => return Err(Error::ReservedOpcode(nibble)),
            _ => return Err(Error::InvalidOpcode(nibble)),
        })
    }
}

impl From<OpCode> for u8 {
    fn from(opcode: OpCode) -> Self {
        opcode as u8
    }
}
