//! Loopback backend answering requests with a test-supplied handler.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use serde_json::{Value, json};
use snippet_harness::protocol::handshake::find_head_end;
use snippet_harness::{
    Config, Connection, HandshakeRequest, HandshakeResponse, HarnessConfig, Message, Role,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

type Handler = dyn Fn(&Value) -> Vec<Value> + Send + Sync;

/// Backend on `127.0.0.1:<random>`. Every text request is recorded, then
/// answered with whatever the handler returns, in order.
pub struct MockKuzzle {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
    task: JoinHandle<()>,
}

impl MockKuzzle {
    pub async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = requests.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    if let Ok(conn) = accept(stream).await {
                        serve(conn, handler, recorded).await;
                    }
                });
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    /// Answers `server:now` with `now`, anything else with an empty result.
    pub async fn with_clock(now: i64) -> Self {
        Self::spawn(move |request| {
            if request["controller"] == "server" && request["action"] == "now" {
                vec![reply(request, json!({ "now": now }))]
            } else {
                vec![reply(request, json!({}))]
            }
        })
        .await
    }

    /// Harness settings pointing at this backend.
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            ..HarnessConfig::default()
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Successful response to `request`.
pub fn reply(request: &Value, result: Value) -> Value {
    json!({
        "requestId": request["requestId"],
        "status": 200,
        "controller": request["controller"],
        "action": request["action"],
        "error": null,
        "result": result,
    })
}

/// Error response to `request`.
pub fn reply_error(request: &Value, status: u16, message: &str) -> Value {
    json!({
        "requestId": request["requestId"],
        "status": status,
        "controller": request["controller"],
        "action": request["action"],
        "error": { "status": status, "id": "api.assert.failed", "message": message },
        "result": null,
    })
}

async fn accept(mut stream: TcpStream) -> snippet_harness::Result<Connection<TcpStream>> {
    let mut buf = BytesMut::with_capacity(1024);
    let end = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(snippet_harness::Error::ConnectionClosed(None));
        }
    };

    let request = HandshakeRequest::parse(&buf[..end])?;
    request.validate()?;
    let mut response = Vec::new();
    HandshakeResponse::from_request(&request).write(&mut response)?;
    stream.write_all(&response).await?;

    let leftover = buf.split_off(end);
    Ok(Connection::with_buffered(
        stream,
        Role::Server,
        Config::server(),
        leftover,
    ))
}

async fn serve(
    mut conn: Connection<TcpStream>,
    handler: Arc<Handler>,
    recorded: Arc<Mutex<Vec<Value>>>,
) {
    while let Ok(Some(message)) = conn.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        recorded.lock().push(request.clone());
        for answer in handler(&request) {
            if conn.send(Message::text(answer.to_string())).await.is_err() {
                return;
            }
        }
    }
}
