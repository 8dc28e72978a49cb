//! Minimal client for the realtime JSON API.
//!
//! Every request carries a `requestId`; the response echoing it is returned
//! to the caller. Anything else arriving in the meantime is a notification
//! and is queued for [`Kuzzle::next_notification`].

mod request;

pub use request::{ApiError, Request, Response};

use std::collections::VecDeque;

use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::transport::WebSocket;

/// Name reported in every request's volatile data.
pub const SDK_NAME: &str = concat!("snippet-harness@", env!("CARGO_PKG_VERSION"));

/// Client bound to one transport.
pub struct Kuzzle {
    transport: WebSocket,
    conn: Option<Connection<TcpStream>>,
    instance_id: String,
    notifications: VecDeque<Value>,
}

impl Kuzzle {
    /// Wrap a transport. Nothing is opened until [`Kuzzle::connect`].
    #[must_use]
    pub fn new(transport: WebSocket) -> Self {
        Self {
            transport,
            conn: None,
            instance_id: uuid::Uuid::new_v4().to_string(),
            notifications: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn transport(&self) -> &WebSocket {
        &self.transport
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(Connection::is_open)
    }

    /// Open the connection. Does nothing when already connected.
    ///
    /// # Errors
    ///
    /// Any transport error; there is no retry.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.conn = Some(self.transport.connect().await?);
        debug!(address = %self.transport.address(), instance = %self.instance_id, "connected");
        Ok(())
    }

    /// Send `request` and wait for its response.
    ///
    /// A missing `requestId` is filled with a fresh UUID, and the volatile
    /// data gains this client's `sdkName` and `sdkInstanceId`.
    ///
    /// # Errors
    ///
    /// - `Error::NotConnected` before [`Kuzzle::connect`]
    /// - `Error::Api` when the response carries an error object
    /// - `Error::ConnectionClosed` if the connection ends first
    pub async fn query(&mut self, mut request: Request) -> Result<Response> {
        let request_id = request
            .request_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();

        let volatile = request.volatile.get_or_insert_with(Map::new);
        volatile.insert("sdkInstanceId".into(), Value::String(self.instance_id.clone()));
        volatile.insert("sdkName".into(), Value::String(SDK_NAME.into()));

        let payload = serde_json::to_string(&request)?;
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        debug!(
            controller = %request.controller,
            action = %request.action,
            request_id = %request_id,
            "query"
        );
        conn.send(Message::text(payload)).await?;

        loop {
            let value = self.next_value().await?.ok_or(Error::ConnectionClosed(None))?;
            let response: Response = match serde_json::from_value(value.clone()) {
                Ok(response) => response,
                Err(_) => {
                    self.notifications.push_back(value);
                    continue;
                }
            };
            if !response.answers(&request_id) {
                self.notifications.push_back(value);
                continue;
            }
            if let Some(error) = response.error {
                return Err(Error::Api {
                    status: error.status,
                    id: error.id,
                    message: error.message,
                });
            }
            return Ok(response);
        }
    }

    /// Server clock, in milliseconds since the epoch.
    ///
    /// # Errors
    ///
    /// `Error::BadResponse` unless the result is an object with a numeric
    /// `now`, plus anything [`Kuzzle::query`] returns.
    pub async fn server_now(&mut self) -> Result<i64> {
        let response = self.query(Request::new("server", "now")).await?;
        let now = response.result.get("now").and_then(|now| {
            now.as_i64()
                .or_else(|| now.as_f64().map(|float| float as i64))
        });
        now.ok_or_else(|| Error::BadResponse("bad response format".into()))
    }

    /// Create a document and return the stored document.
    ///
    /// # Errors
    ///
    /// Anything [`Kuzzle::query`] returns.
    pub async fn create_document(
        &mut self,
        index: &str,
        collection: &str,
        body: Value,
    ) -> Result<Value> {
        let request = Request::new("document", "create")
            .with_index(index)
            .with_collection(collection)
            .with_body(body);
        Ok(self.query(request).await?.result)
    }

    /// Next notification, queued or freshly received.
    ///
    /// Returns `Ok(None)` once the connection has ended.
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` before [`Kuzzle::connect`], or transport errors.
    pub async fn next_notification(&mut self) -> Result<Option<Value>> {
        if let Some(queued) = self.notifications.pop_front() {
            return Ok(Some(queued));
        }
        self.next_value().await
    }

    /// Close the connection. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Transport errors while sending the close frame.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        debug!(address = %self.transport.address(), "disconnecting");
        let closed = match conn.close(CloseCode::Normal, "").await {
            Err(e) if e.is_disconnect() => Ok(()),
            other => other,
        };
        if let Err(e) = conn.shutdown().await {
            debug!(error = %e, "shutdown after close failed");
        }
        closed
    }

    async fn next_value(&mut self) -> Result<Option<Value>> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        loop {
            match conn.recv().await? {
                Some(Message::Text(text)) => match serde_json::from_str(&text) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => warn!(error = %e, "discarding non-JSON message"),
                },
                Some(Message::Close(frame)) => {
                    debug!(?frame, "server closed the connection");
                    return Ok(None);
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
    }
}

impl std::fmt::Debug for Kuzzle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kuzzle")
            .field("address", &self.transport.address())
            .field("connected", &self.is_connected())
            .field("instance_id", &self.instance_id)
            .field("queued", &self.notifications.len())
            .finish()
    }
}
