//! Shared fixtures for integration tests.
//!
//! `MockKuzzle` is a loopback backend speaking the JSON API over the crate's
//! own server-side connection.

mod server;

pub use server::{MockKuzzle, reply, reply_error};
