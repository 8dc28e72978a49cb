//! The code a template wraps.

use std::io::Write;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::Kuzzle;
use crate::error::Result;
use crate::harness::OutputSink;

/// A documentation snippet.
///
/// `run` may return a result value; the `PrintResult` template prints its
/// `successes` list. Realtime snippets receive notifications through
/// `on_notification` until they write something.
#[async_trait]
pub trait Snippet: Send {
    fn name(&self) -> &str;

    async fn run(&mut self, client: &mut Kuzzle, out: &mut OutputSink) -> Result<Option<Value>>;

    async fn on_notification(
        &mut self,
        _client: &mut Kuzzle,
        _notification: Value,
        _out: &mut OutputSink,
    ) -> Result<()> {
        Ok(())
    }
}

/// Prints the server clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerNow;

#[async_trait]
impl Snippet for ServerNow {
    fn name(&self) -> &str {
        "server-now"
    }

    async fn run(&mut self, client: &mut Kuzzle, out: &mut OutputSink) -> Result<Option<Value>> {
        let now = client.server_now().await?;
        writeln!(out, "Epoch millis: {now}")?;
        Ok(Some(Value::from(now)))
    }
}
