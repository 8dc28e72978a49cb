//! End-to-end runs of the program templates against a loopback backend.

mod harness;

use std::io::Write;

use async_trait::async_trait;
use harness::{MockKuzzle, reply, reply_error};
use serde_json::{Value, json};
use snippet_harness::client::Request;
use snippet_harness::harness::SharedBuffer;
use snippet_harness::{
    ExitStatus, HarnessConfig, Kuzzle, OutputSink, Program, ServerNow, Snippet, Template,
};

/// Writes fixed bytes, optionally returning a result.
struct Writes {
    bytes: Vec<u8>,
    result: Option<Value>,
}

impl Writes {
    fn text(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
            result: None,
        }
    }
}

#[async_trait]
impl Snippet for Writes {
    fn name(&self) -> &str {
        "writes"
    }

    async fn run(
        &mut self,
        _client: &mut Kuzzle,
        out: &mut OutputSink,
    ) -> snippet_harness::Result<Option<Value>> {
        out.write_all(&self.bytes)?;
        Ok(self.result.clone())
    }
}

/// Writes, then queries `fail:now`, which the backend rejects.
struct WritesThenFails;

#[async_trait]
impl Snippet for WritesThenFails {
    fn name(&self) -> &str {
        "writes-then-fails"
    }

    async fn run(
        &mut self,
        client: &mut Kuzzle,
        out: &mut OutputSink,
    ) -> snippet_harness::Result<Option<Value>> {
        writeln!(out, "before the failure")?;
        client.query(Request::new("fail", "now")).await?;
        writeln!(out, "never printed")?;
        Ok(None)
    }
}

/// Subscribes and prints once a notification arrives.
struct Subscribes;

#[async_trait]
impl Snippet for Subscribes {
    fn name(&self) -> &str {
        "subscribes"
    }

    async fn run(
        &mut self,
        client: &mut Kuzzle,
        _out: &mut OutputSink,
    ) -> snippet_harness::Result<Option<Value>> {
        let request = Request::new("realtime", "subscribe")
            .with_index("nyc-open-data")
            .with_collection("yellow-taxi")
            .with_body(json!({}));
        client.query(request).await?;
        Ok(None)
    }

    async fn on_notification(
        &mut self,
        _client: &mut Kuzzle,
        notification: Value,
        out: &mut OutputSink,
    ) -> snippet_harness::Result<()> {
        if notification["type"] == "document" {
            writeln!(out, "Document notification: {}", notification["result"]["_id"])?;
        }
        Ok(())
    }
}

/// Writes nothing at all.
struct Silent;

#[async_trait]
impl Snippet for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    async fn run(
        &mut self,
        _client: &mut Kuzzle,
        _out: &mut OutputSink,
    ) -> snippet_harness::Result<Option<Value>> {
        Ok(None)
    }
}

fn output() -> (SharedBuffer, OutputSink) {
    let buffer = SharedBuffer::new();
    let sink = OutputSink::writer(buffer.clone());
    (buffer, sink)
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_unreachable_backend_exits_one() {
    let port = free_port();
    let logs = SharedBuffer::new();
    let log_writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || log_writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::ERROR)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let config = HarnessConfig {
        host: "127.0.0.1".into(),
        port,
        ..HarnessConfig::default()
    };
    let (buffer, out) = output();
    let status = Program::new(Template::Capture, Writes::text("unused"))
        .run(&config, out)
        .await;

    assert_eq!(status, ExitStatus::Failure);
    assert!(buffer.contents().is_empty());

    let logged = logs.to_string_lossy();
    assert!(logged.contains("ERROR"), "{logged}");
    assert!(logged.contains("cannot connect"), "{logged}");
    assert!(logged.contains("host=127.0.0.1"), "{logged}");
    assert!(logged.contains(&format!("port={port}")), "{logged}");
}

#[tokio::test]
async fn test_server_now_plain() {
    let server = MockKuzzle::with_clock(1_700_000_000_123).await;
    let (buffer, out) = output();

    let status = Program::new(Template::Plain, ServerNow)
        .run(&server.config(), out)
        .await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(buffer.to_string_lossy(), "Epoch millis: 1700000000123\n");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]["requestId"].is_string());
    assert!(requests[0]["volatile"]["sdkInstanceId"].is_string());
    server.shutdown();
}

#[tokio::test]
async fn test_capture_echoes_exact_bytes() {
    let server = MockKuzzle::with_clock(0).await;
    let bytes: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let (buffer, out) = output();

    let snippet = Writes {
        bytes: bytes.clone(),
        result: None,
    };
    let status = Program::new(Template::Capture, snippet)
        .run(&server.config(), out)
        .await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(buffer.contents(), bytes);
    server.shutdown();
}

#[tokio::test]
async fn test_capture_keeps_first_4096_bytes() {
    let server = MockKuzzle::with_clock(0).await;
    let bytes: Vec<u8> = (0..5000).map(|i| b'a' + (i % 26) as u8).collect();
    let (buffer, out) = output();

    let snippet = Writes {
        bytes: bytes.clone(),
        result: None,
    };
    let status = Program::new(Template::Capture, snippet)
        .run(&server.config(), out)
        .await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(buffer.contents(), bytes[..4096].to_vec());
    server.shutdown();
}

#[tokio::test]
async fn test_output_after_capture_is_unaffected() {
    let server = MockKuzzle::with_clock(0).await;
    let (buffer, mut out) = output();

    let status = Program::new(Template::Capture, Writes::text("hello\n"))
        .run(&server.config(), out.clone())
        .await;
    assert_eq!(status, ExitStatus::Success);

    writeln!(out, "after").unwrap();
    assert_eq!(buffer.to_string_lossy(), "hello\nafter\n");
    server.shutdown();
}

#[tokio::test]
async fn test_snippet_failure_still_echoes_capture() {
    let server = MockKuzzle::spawn(|request| {
        vec![reply_error(request, 400, "nope")]
    })
    .await;
    let (buffer, out) = output();

    let status = Program::new(Template::Capture, WritesThenFails)
        .run(&server.config(), out)
        .await;

    assert_eq!(status, ExitStatus::Failure);
    assert_eq!(buffer.to_string_lossy(), "before the failure\n");
    server.shutdown();
}

#[tokio::test]
async fn test_realtime_output_before_watchdog() {
    let server = MockKuzzle::with_clock(0).await;
    let (buffer, out) = output();

    let status = Program::new(Template::Realtime, Writes::text("ready\n"))
        .run(&server.config(), out)
        .await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(buffer.to_string_lossy(), "ready\n");
    server.shutdown();
}

#[tokio::test]
async fn test_realtime_waits_for_notification() {
    let server = MockKuzzle::spawn(|request| {
        let mut answers = vec![reply(request, json!({"roomId": "room-1", "channel": "chan-1"}))];
        if request["action"] == "subscribe" {
            answers.push(json!({
                "room": "chan-1",
                "type": "document",
                "action": "create",
                "result": {"_id": "taxi-42", "_source": {}},
            }));
        }
        answers
    })
    .await;
    let (buffer, out) = output();

    let status = Program::new(Template::Realtime, Subscribes)
        .run(&server.config(), out)
        .await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(
        buffer.to_string_lossy(),
        "Document notification: \"taxi-42\"\n"
    );
    server.shutdown();
}

#[tokio::test]
async fn test_realtime_silence_trips_watchdog() {
    let server = MockKuzzle::with_clock(0).await;
    let config = HarnessConfig {
        watchdog_secs: 1,
        ..server.config()
    };
    let (buffer, out) = output();

    let started = std::time::Instant::now();
    let status = Program::new(Template::Realtime, Silent).run(&config, out).await;

    assert_eq!(status, ExitStatus::Failure);
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    assert!(buffer.contents().is_empty());
    server.shutdown();
}

#[tokio::test]
async fn test_realtime_output_counts_with_zero_capture_limit() {
    let server = MockKuzzle::with_clock(0).await;
    let config = HarnessConfig {
        capture_limit: 0,
        watchdog_secs: 1,
        ..server.config()
    };
    let (buffer, out) = output();

    let status = Program::new(Template::Realtime, Writes::text("hello\n"))
        .run(&config, out)
        .await;

    assert_eq!(status, ExitStatus::Success);
    assert!(buffer.contents().is_empty());
    server.shutdown();
}

#[tokio::test]
async fn test_print_result_lists_successes() {
    let server = MockKuzzle::with_clock(0).await;
    let (buffer, out) = output();

    let snippet = Writes {
        bytes: Vec::new(),
        result: Some(json!({"successes": [{"_id": "a"}, {"_id": "b"}], "errors": []})),
    };
    let status = Program::new(Template::PrintResult, snippet)
        .run(&server.config(), out)
        .await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(
        buffer.to_string_lossy(),
        "[{\"_id\":\"a\"},{\"_id\":\"b\"}]\n{\"_id\":\"a\"}\n{\"_id\":\"b\"}\n"
    );
    server.shutdown();
}

#[tokio::test]
async fn test_create_document_after_snippet() {
    let server = MockKuzzle::spawn(|request| {
        vec![reply(request, json!({"_id": "driver-1", "_source": request["body"]}))]
    })
    .await;
    let (buffer, out) = output();

    let status = Program::new(Template::CreateDocumentAfter, Writes::text("snippet ran\n"))
        .run(&server.config(), out)
        .await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(buffer.to_string_lossy(), "snippet ran\n");

    let requests = server.requests();
    let create = requests
        .iter()
        .find(|r| r["controller"] == "document" && r["action"] == "create")
        .expect("document:create was sent");
    assert_eq!(create["index"], "nyc-open-data");
    assert_eq!(create["collection"], "yellow-taxi");
    assert_eq!(
        create["body"],
        json!({"name": "Sirkis", "birthday": "1959-06-22", "license": "B"})
    );
    server.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_programs_get_their_own_answers() {
    let server = MockKuzzle::with_clock(42).await;
    let config = server.config();

    let runs = (0..8).map(|_| {
        let config = config.clone();
        async move {
            let (buffer, out) = output();
            let status = Program::new(Template::Capture, ServerNow).run(&config, out).await;
            (status, buffer.to_string_lossy())
        }
    });
    let results = futures::future::join_all(runs).await;

    for (status, text) in results {
        assert_eq!(status, ExitStatus::Success);
        assert_eq!(text, "Epoch millis: 42\n");
    }

    let requests = server.requests();
    assert_eq!(requests.len(), 8);
    let mut instances: Vec<_> = requests
        .iter()
        .map(|r| r["volatile"]["sdkInstanceId"].as_str().unwrap().to_string())
        .collect();
    instances.sort();
    instances.dedup();
    assert_eq!(instances.len(), 8);
    server.shutdown();
}
