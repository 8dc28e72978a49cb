//! Message-level connection and its state machine.
//!
//! A connection starts `Open` once the upgrade handshake has completed,
//! moves to `Closing` after this side sends a close frame, and ends
//! `Closed` when the peer's close frame arrives or the stream ends.

mod role;
mod state;

pub use role::Role;
pub use state::ConnectionState;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
