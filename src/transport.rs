//! TCP transport bound to one host and port.
//!
//! ```rust,ignore
//! let ws = WebSocket::new("kuzzle", WebSocketOptions::default());
//! let mut conn = ws.connect().await?;
//! ```

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::{Config, DEFAULT_PORT, Limits};
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::protocol::handshake::{ClientHandshake, HandshakeResponse, find_head_end};

/// Options for [`WebSocket`].
#[derive(Debug, Clone)]
pub struct WebSocketOptions {
    /// Service port. Default: 7512.
    pub port: u16,
    /// Extra headers sent with the upgrade request.
    pub headers: Vec<(String, String)>,
    /// Limits, buffer sizes and connect timeout.
    pub config: Config,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            headers: Vec::new(),
            config: Config::client(),
        }
    }
}

impl WebSocketOptions {
    /// Use another port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Add a header to the upgrade request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the connection configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
}

/// A WebSocket transport constructor. Nothing happens until [`connect`].
///
/// [`connect`]: WebSocket::connect
#[derive(Debug, Clone)]
pub struct WebSocket {
    host: String,
    options: WebSocketOptions,
}

impl WebSocket {
    #[must_use]
    pub fn new(host: impl Into<String>, options: WebSocketOptions) -> Self {
        Self {
            host: host.into(),
            options,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.options.port
    }

    /// `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.options.port)
    }

    /// Open the TCP stream and perform the upgrade handshake.
    ///
    /// The whole sequence is bounded by the configured connect timeout.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectTimeout` when the timeout elapses
    /// - `Error::Io` when the TCP connection fails
    /// - handshake errors from [`client_handshake`]
    pub async fn connect(&self) -> Result<Connection<TcpStream>> {
        let attempt = self.open();
        match self.options.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| Error::ConnectTimeout {
                    address: self.address(),
                })?,
            None => attempt.await,
        }
    }

    async fn open(&self) -> Result<Connection<TcpStream>> {
        debug!(address = %self.address(), "opening websocket");
        let mut stream = TcpStream::connect((self.host.as_str(), self.options.port)).await?;
        stream.set_nodelay(true)?;

        let request = self
            .options
            .headers
            .iter()
            .fold(ClientHandshake::new(&self.host, self.options.port), |req, (name, value)| {
                req.with_header(name.as_str(), value.as_str())
            });
        let buffered =
            client_handshake(&mut stream, &request, &self.options.config.limits).await?;

        debug!(address = %self.address(), "websocket open");
        Ok(Connection::with_buffered(
            stream,
            Role::Client,
            self.options.config.clone(),
            buffered,
        ))
    }
}

/// Send `request` and read the server's answer from `stream`.
///
/// Returns any bytes received after the response head; they belong to the
/// first frames.
///
/// # Errors
///
/// - `Error::HandshakeTooLarge` if the head exceeds `limits`
/// - `Error::InvalidHandshake` for a bad response, a wrong accept key or a
///   stream closed mid-handshake
pub async fn client_handshake<S>(
    stream: &mut S,
    request: &ClientHandshake,
    limits: &Limits,
) -> Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut out = Vec::new();
    request.write(&mut out)?;
    stream.write_all(&out).await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(1024);
    let head_len = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        limits.check_handshake_size(buf.len())?;
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(Error::InvalidHandshake(
                "Connection closed during handshake".into(),
            ));
        }
    };
    limits.check_handshake_size(head_len)?;

    let head = buf.split_to(head_len);
    HandshakeResponse::parse(&head)?.verify(request.key())?;
    Ok(buf)
}
