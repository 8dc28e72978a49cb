//! Which end of the connection we are, and the masking policy that follows.

use crate::error::{Error, Result};
use crate::protocol::mask::random_mask;

/// Side of a WebSocket connection.
///
/// The harness itself is always the client; the server role exists for the
/// in-process services used by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Masking key for the next outgoing frame. Clients draw a fresh key
    /// per frame; servers send in the clear.
    #[must_use]
    pub fn outgoing_mask(self) -> Option<[u8; 4]> {
        match self {
            Role::Client => Some(random_mask()),
            Role::Server => None,
        }
    }

    /// Check the masking of a frame received by this side.
    ///
    /// `lenient` lets a server take unmasked frames from sloppy clients.
    ///
    /// # Errors
    ///
    /// `Error::UnmaskedClientFrame` on a server, `Error::MaskedServerFrame`
    /// on a client.
    pub fn check_incoming(self, masked: bool, lenient: bool) -> Result<()> {
        match (self, masked) {
            (Role::Server, false) if !lenient => Err(Error::UnmaskedClientFrame),
            (Role::Client, true) => Err(Error::MaskedServerFrame),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_clients_mask() {
        assert!(Role::Client.outgoing_mask().is_some());
        assert_eq!(Role::Server.outgoing_mask(), None);
    }

    #[test]
    fn test_incoming_masking_rules() {
        assert!(Role::Server.check_incoming(true, false).is_ok());
        assert!(matches!(
            Role::Server.check_incoming(false, false),
            Err(Error::UnmaskedClientFrame)
        ));
        assert!(Role::Server.check_incoming(false, true).is_ok());

        assert!(Role::Client.check_incoming(false, false).is_ok());
        assert!(matches!(
            Role::Client.check_incoming(true, true),
            Err(Error::MaskedServerFrame)
        ));
    }
}
