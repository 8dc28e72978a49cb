//! Connection lifecycle and its close handshake (RFC 6455 Section 7).

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    /// Our close frame is out; still reading until the peer's arrives.
    Closing,
    Closed,
}

impl ConnectionState {
    #[must_use]
    #[inline]
    pub const fn can_send(self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Reading continues while a close handshake is in flight.
    #[must_use]
    #[inline]
    pub const fn can_receive(self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }

    /// This side starts the close handshake. Returns whether a close frame
    /// should be sent, which is only the case from `Open`.
    pub fn begin_close(&mut self) -> bool {
        if *self == ConnectionState::Open {
            *self = ConnectionState::Closing;
            true
        } else {
            false
        }
    }

    /// The peer's close frame arrived. Returns whether it must be echoed,
    /// which is the case unless we started the handshake.
    pub fn peer_closed(&mut self) -> bool {
        let echo = *self == ConnectionState::Open;
        *self = ConnectionState::Closed;
        echo
    }
}
