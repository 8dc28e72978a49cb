//! Client construction and the fail-fast connect.

use tracing::{error, info};

use crate::client::Kuzzle;
use crate::config::HarnessConfig;
use crate::harness::ExitStatus;
use crate::transport::{WebSocket, WebSocketOptions};

/// Build an unconnected client for the configured address.
#[must_use]
pub fn client(config: &HarnessConfig) -> Kuzzle {
    let options = WebSocketOptions::default()
        .with_port(config.port)
        .with_config(config.connection_config());
    Kuzzle::new(WebSocket::new(config.host.clone(), options))
}

/// Connect once. A failure is logged and becomes [`ExitStatus::Failure`].
///
/// # Errors
///
/// Returns the exit status to report when the connection fails.
pub async fn connect(config: &HarnessConfig) -> Result<Kuzzle, ExitStatus> {
    let mut kuzzle = client(config);
    match kuzzle.connect().await {
        Ok(()) => {
            info!(host = %config.host, port = config.port, "connected");
            Ok(kuzzle)
        }
        Err(e) => {
            error!(host = %config.host, port = config.port, error = %e, "cannot connect");
            Err(ExitStatus::Failure)
        }
    }
}
