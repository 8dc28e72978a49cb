//! Header checks applied before a frame's payload is buffered.

use crate::config::Limits;
use crate::connection::Role;
use crate::error::Result;
use crate::protocol::frame::FrameHeader;
use crate::{Error, protocol::OpCode};

/// Validates incoming frame headers for one side of a connection.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
    accept_unmasked_frames: bool,
}

impl FrameValidator {
    /// Create a validator for frames received by `role`.
    #[must_use]
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            limits,
            accept_unmasked_frames: false,
        }
    }

    /// Let a server accept unmasked client frames.
    #[must_use]
    pub fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Check a decoded header.
    ///
    /// Masking is checked first, then RSV bits, then the size limit, then
    /// the opcode.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` / `Error::MaskedServerFrame`
    /// - `Error::ReservedBitsSet`
    /// - `Error::FrameTooLarge`
    /// - `Error::ReservedOpcode` / `Error::InvalidOpcode`
    pub fn validate(&self, header: &FrameHeader) -> Result<OpCode> {
        self.role
            .check_incoming(header.mask.is_some(), self.accept_unmasked_frames)?;

        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        self.limits.check_frame_size(header.payload_len)?;
        OpCode::try_from(header.opcode)
    }
}
