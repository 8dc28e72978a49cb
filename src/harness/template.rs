//! The program templates.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::client::Kuzzle;
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::harness::{ExitStatus, OutputSink, Snippet, Watchdog, bootstrap};

/// Index and collection used by [`Template::CreateDocumentAfter`].
pub const AFTER_INDEX: &str = "nyc-open-data";
pub const AFTER_COLLECTION: &str = "yellow-taxi";

/// How a snippet is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    /// Output goes straight to the real output.
    Plain,
    /// Output is captured, then echoed.
    Capture,
    /// Like `Capture`, but waits under the watchdog until output appears.
    Realtime,
    /// Prints `result.successes` and each of its elements.
    PrintResult,
    /// Creates a document once the snippet has run.
    CreateDocumentAfter,
}

impl Template {
    pub const ALL: [Template; 5] = [
        Template::Plain,
        Template::Capture,
        Template::Realtime,
        Template::PrintResult,
        Template::CreateDocumentAfter,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Template::Plain => "plain",
            Template::Capture => "capture",
            Template::Realtime => "realtime",
            Template::PrintResult => "print-result",
            Template::CreateDocumentAfter => "create-document-after",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Template {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Template::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Template::ALL.iter().map(|t| t.name()).collect();
                Error::Config(format!("unknown template {s:?}, expected one of {known:?}"))
            })
    }
}

/// A snippet bound to its template.
pub struct Program<S> {
    template: Template,
    snippet: S,
}

impl<S: Snippet> Program<S> {
    #[must_use]
    pub fn new(template: Template, snippet: S) -> Self {
        Self { template, snippet }
    }

    /// Connect, run, disconnect.
    ///
    /// `out` is the real output; captured bytes are echoed to it.
    pub async fn run(mut self, config: &HarnessConfig, out: OutputSink) -> ExitStatus {
        let mut client = match bootstrap::connect(config).await {
            Ok(client) => client,
            Err(status) => return status,
        };

        debug!(template = %self.template, snippet = self.snippet.name(), "running");
        let status = self.execute(&mut client, config, out).await;

        if let Err(e) = client.disconnect().await {
            debug!(error = %e, "disconnect failed");
        }
        status
    }

    async fn execute(
        &mut self,
        client: &mut Kuzzle,
        config: &HarnessConfig,
        mut out: OutputSink,
    ) -> ExitStatus {
        match self.template {
            Template::Plain => {
                let outcome = self.snippet.run(client, &mut out).await.map(drop);
                self.finish(outcome)
            }
            Template::Capture => {
                let mut sink = OutputSink::capture(config.capture_limit);
                let outcome = self.snippet.run(client, &mut sink).await.map(drop);
                let echoed = echo(&sink, &mut out);
                self.finish(outcome.and(echoed))
            }
            Template::Realtime => {
                let mut sink = OutputSink::capture(config.capture_limit);
                let watchdog = Watchdog::new(config.watchdog_timeout());
                let guarded = watchdog
                    .guard(wait_for_output(&mut self.snippet, client, &mut sink))
                    .await;
                drop(watchdog);

                match guarded {
                    Ok(outcome) => {
                        let echoed = echo(&sink, &mut out);
                        self.finish(outcome.and(echoed))
                    }
                    Err(_) => ExitStatus::Failure,
                }
            }
            Template::PrintResult => {
                let outcome = match self.snippet.run(client, &mut out).await {
                    Ok(result) => print_successes(result.as_ref(), &mut out),
                    Err(e) => Err(e),
                };
                self.finish(outcome)
            }
            Template::CreateDocumentAfter => {
                let outcome = match self.snippet.run(client, &mut out).await {
                    Ok(_) => client
                        .create_document(AFTER_INDEX, AFTER_COLLECTION, driver())
                        .await
                        .map(drop)
                        .inspect_err(|e| error!(error = %e, "error creating document")),
                    Err(e) => Err(e),
                };
                self.finish(outcome)
            }
        }
    }

    fn finish(&self, outcome: Result<()>) -> ExitStatus {
        match outcome {
            Ok(()) => ExitStatus::Success,
            Err(e) => {
                error!(snippet = self.snippet.name(), error = %e, "snippet failed");
                ExitStatus::Failure
            }
        }
    }
}

/// Run the snippet, then feed it notifications until it has written.
async fn wait_for_output<S: Snippet>(
    snippet: &mut S,
    client: &mut Kuzzle,
    sink: &mut OutputSink,
) -> Result<()> {
    snippet.run(client, sink).await?;

    while !sink.has_written() {
        let watcher = sink.clone();
        let next = tokio::select! {
            () = watcher.written() => None,
            notification = client.next_notification() => Some(notification?),
        };
        match next {
            None => break,
            Some(Some(notification)) => {
                snippet.on_notification(client, notification, sink).await?;
            }
            Some(None) => return Err(Error::ConnectionClosed(None)),
        }
    }
    Ok(())
}

fn echo(sink: &OutputSink, out: &mut OutputSink) -> Result<()> {
    if sink.dropped() > 0 {
        warn!(dropped = sink.dropped(), "capture buffer full, output truncated");
    }
    if let Some(bytes) = sink.captured() {
        out.write_all(&bytes)?;
        out.flush()?;
    }
    Ok(())
}

fn print_successes(result: Option<&Value>, out: &mut OutputSink) -> Result<()> {
    let successes = result
        .and_then(|r| r.get("successes"))
        .and_then(Value::as_array)
        .ok_or_else(|| Error::BadResponse("result has no successes list".into()))?;

    writeln!(out, "{}", Value::Array(successes.clone()))?;
    for element in successes {
        match element {
            Value::String(s) => writeln!(out, "{s}")?,
            other => writeln!(out, "{other}")?,
        }
    }
    Ok(())
}

fn driver() -> Value {
    json!({
        "name": "Sirkis",
        "birthday": "1959-06-22",
        "license": "B"
    })
}
