//! # snippet-harness
//!
//! Program templates and a test runner for documentation snippets that talk
//! to a realtime backend over WebSocket.
//!
//! ## Layers
//!
//! - **protocol / codec / connection**: an RFC 6455 client (and the server
//!   side used by tests) on top of tokio.
//! - **transport / client**: the WebSocket transport and a minimal
//!   request/response client with `requestId` correlation.
//! - **harness**: templates that connect, run a snippet, capture its output
//!   and enforce a watchdog.
//! - **suite**: renders snippets into templates, runs them with each SDK's
//!   toolchain, checks expected output and writes a JSON report.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use snippet_harness::{HarnessConfig, OutputSink, Program, ServerNow, Template};
//!
//! let config = HarnessConfig::default().apply_env()?;
//! let status = Program::new(Template::Capture, ServerNow)
//!     .run(&config, OutputSink::stdout())
//!     .await;
//! std::process::exit(status.code().into());
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod harness;
pub mod message;
pub mod protocol;
pub mod suite;
pub mod transport;

pub use client::{Kuzzle, Request, Response};
pub use codec::WebSocketCodec;
pub use config::{Config, HarnessConfig, Limits, RunnerConfig, SuiteConfig};
pub use connection::{Connection, ConnectionState, Role};
pub use error::{Error, Result};
pub use harness::{ExitStatus, OutputSink, Program, ServerNow, Snippet, Template, Watchdog};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
pub use suite::{ResultCode, TestFailure, TestManager};
pub use transport::{WebSocket, WebSocketOptions};
