//! HTTP Upgrade handshake (RFC 6455 Section 4).
//!
//! The client side builds the upgrade request and verifies the server's
//! answer. The server side parsing exists for in-process test services.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Base64(SHA-1(key + GUID))`.
///
/// ```
/// use snippet_harness::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a random `Sec-WebSocket-Key` (16 random bytes, Base64).
#[must_use]
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    if getrandom::getrandom(&mut nonce).is_err() {
        // uuid draws from the same source but has its own fallback chain
        nonce = *uuid::Uuid::new_v4().as_bytes();
    }
    BASE64.encode(nonce)
}

/// Index just past the blank line ending an HTTP head, if present.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Lowercased header map. Duplicates of `unique` headers are rejected.
fn parse_headers<'a, I>(lines: I, unique: &[&str]) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            if unique.contains(&name.as_str()) && headers.contains_key(&name) {
                return Err(Error::InvalidHandshake(format!("Duplicate header: {name}")));
            }
            headers.insert(name, value.trim().to_string());
        }
    }
    Ok(headers)
}

fn validate_header_value(header: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

fn require<'h>(headers: &'h HashMap<String, String>, name: &str) -> Result<&'h str> {
    headers
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidHandshake(format!("Missing {name} header")))
}

/// Upgrade request sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    host: String,
    port: u16,
    key: String,
    headers: Vec<(String, String)>,
}

impl ClientHandshake {
    /// Request for `ws://host:port/` with a fresh random key.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            key: generate_key(),
            headers: Vec::new(),
        }
    }

    /// Use a fixed key instead of a random one.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Add a custom header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The `Sec-WebSocket-Key` this request carries.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append the HTTP request to `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if a value contains CR or LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        validate_header_value("Host", &self.host)?;

        buf.extend_from_slice(b"GET / HTTP/1.1\r\n");
        buf.extend_from_slice(format!("Host: {}:{}\r\n", self.host, self.port).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
        for (name, value) in &self.headers {
            validate_header_value(name, name)?;
            validate_header_value(name, value)?;
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}

/// Parsed upgrade request, as seen by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request path.
    pub path: String,
    /// Host header value.
    pub host: String,
    /// Sec-WebSocket-Key header value.
    pub key: String,
    /// Sec-WebSocket-Version header value.
    pub version: u8,
}

impl HandshakeRequest {
    /// Parse an upgrade request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] for anything but a `GET` HTTP/1.1
    /// upgrade carrying `Host`, `Upgrade: websocket`, `Connection: upgrade`,
    /// a key and a version, or when one of those headers is duplicated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, path, version] = parts.as_slice() else {
            return Err(Error::InvalidHandshake("Invalid request line".into()));
        };
        if *method != "GET" {
            return Err(Error::InvalidHandshake(format!(
                "Expected GET method, got {method}"
            )));
        }
        if !version.starts_with("HTTP/1.1") {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.1, got {version}"
            )));
        }

        let headers = parse_headers(
            lines,
            &[
                "host",
                "upgrade",
                "connection",
                "sec-websocket-key",
                "sec-websocket-version",
            ],
        )?;

        let upgrade = require(&headers, "upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }
        let connection = require(&headers, "connection")?;
        if !connection.to_ascii_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }
        let host = require(&headers, "host")?.to_string();
        let key = require(&headers, "sec-websocket-key")?.to_string();
        let version_str = require(&headers, "sec-websocket-version")?;
        let version = version_str
            .parse()
            .map_err(|_| Error::InvalidHandshake(format!("Invalid version: {version_str}")))?;

        Ok(Self {
            path: (*path).to_string(),
            host,
            key,
            version,
        })
    }

    /// Check version 13 and a 16-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.version != 13 {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {} (expected 13)",
                self.version
            )));
        }
        match BASE64.decode(&self.key) {
            Ok(decoded) if decoded.len() == 16 => Ok(()),
            Ok(decoded) => Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Key must be 16 bytes, got {}",
                decoded.len()
            ))),
            Err(_) => Err(Error::InvalidHandshake(
                "Invalid Sec-WebSocket-Key: not valid Base64".into(),
            )),
        }
    }
}

/// Upgrade response sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Sec-WebSocket-Accept value.
    pub accept: String,
    /// Selected subprotocol, if any.
    pub protocol: Option<String>,
}

impl HandshakeResponse {
    /// Response accepting `req`.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            protocol: None,
        }
    }

    /// Append the HTTP response to `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if the protocol contains CR or LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        if let Some(proto) = &self.protocol {
            validate_header_value("Sec-WebSocket-Protocol", proto)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse a server response head.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] unless the status is 101 with
    /// `Upgrade: websocket`, `Connection: upgrade` and an accept value.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines, &[])?;
        let upgrade = require(&headers, "upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }
        let connection = require(&headers, "connection")?;
        if !connection.to_ascii_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        Ok(Self {
            accept: require(&headers, "sec-websocket-accept")?.to_string(),
            protocol: headers.get("sec-websocket-protocol").cloned(),
        })
    }

    /// Check that the server answered the key we sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] on mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept == compute_accept_key(key) {
            Ok(())
        } else {
            Err(Error::InvalidHandshake("Invalid Sec-WebSocket-Accept".into()))
        }
    }
}
