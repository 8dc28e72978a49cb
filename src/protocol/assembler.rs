//! Reassembly of fragmented data messages.

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Joins data frames into whole messages.
///
/// Control frames may be interleaved with fragments and are ignored here;
/// the connection handles them directly.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler bounded by `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a frame. Returns the message once its final fragment arrives.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with nothing to
    ///   continue, or a new data frame while a message is in progress
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` on limits
    /// - `Error::InvalidUtf8` if a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (opcode, None) => self.opcode = Some(opcode),
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        let opcode = self.opcode.take();
        self.fragment_count = 0;

        match opcode {
            Some(OpCode::Text) => String::from_utf8(payload)
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
    }
}
