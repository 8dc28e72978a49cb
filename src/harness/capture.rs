//! Output sinks handed to snippets.
//!
//! Snippets never touch the process's standard output directly: they write
//! to the [`OutputSink`] they are given. A capturing sink keeps the first
//! `limit` bytes in a [`CaptureBuffer`] so the template can echo them later.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::DEFAULT_CAPTURE_LIMIT;

/// Bounded byte buffer.
///
/// Bytes past the limit are dropped and counted; the writer is never told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    limit: usize,
    dropped: usize,
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_LIMIT)
    }
}

impl CaptureBuffer {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::with_capacity(limit.min(DEFAULT_CAPTURE_LIMIT)),
            limit,
            dropped: 0,
        }
    }

    /// Store as much of `bytes` as fits. Returns how many were stored.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let room = self.limit.saturating_sub(self.data.len());
        let kept = bytes.len().min(room);
        self.data.extend_from_slice(&bytes[..kept]);
        self.dropped += bytes.len() - kept;
        kept
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes discarded because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.dropped > 0
    }
}

enum Target {
    Stdout,
    Capture(Mutex<CaptureBuffer>),
    Writer(Mutex<Box<dyn Write + Send>>),
}

struct Shared {
    target: Target,
    written: AtomicBool,
    notify: Notify,
}

/// Where a snippet's output goes. Clones share the same destination.
#[derive(Clone)]
pub struct OutputSink {
    shared: Arc<Shared>,
}

impl OutputSink {
    fn with_target(target: Target) -> Self {
        Self {
            shared: Arc::new(Shared {
                target,
                written: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// The process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::with_target(Target::Stdout)
    }

    /// A bounded in-memory capture.
    #[must_use]
    pub fn capture(limit: usize) -> Self {
        Self::with_target(Target::Capture(Mutex::new(CaptureBuffer::new(limit))))
    }

    /// Any other writer, e.g. a file or a shared test buffer.
    #[must_use]
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self::with_target(Target::Writer(Mutex::new(Box::new(writer))))
    }

    /// Snapshot of the captured bytes. `None` unless this is a capture.
    #[must_use]
    pub fn captured(&self) -> Option<Vec<u8>> {
        match &self.shared.target {
            Target::Capture(buffer) => Some(buffer.lock().as_bytes().to_vec()),
            _ => None,
        }
    }

    /// Bytes dropped by a full capture.
    #[must_use]
    pub fn dropped(&self) -> usize {
        match &self.shared.target {
            Target::Capture(buffer) => buffer.lock().dropped(),
            _ => 0,
        }
    }

    /// Whether any byte has reached the destination.
    #[must_use]
    pub fn has_written(&self) -> bool {
        self.shared.written.load(Ordering::Acquire)
    }

    /// Resolves once any byte has reached the destination.
    pub async fn written(&self) {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.has_written() {
                return;
            }
            notified.await;
        }
    }

    fn mark_written(&self) {
        if !self.shared.written.swap(true, Ordering::AcqRel) {
            self.shared.notify.notify_waiters();
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match &self.shared.target {
            Target::Stdout => io::stdout().lock().write_all(buf)?,
            Target::Capture(buffer) => {
                buffer.lock().push(buf);
            }
            Target::Writer(writer) => writer.lock().write_all(buf)?,
        }
        // Output counts even when the capture has no room left for it.
        self.mark_written();
        // Overflow is silent: the snippet must not see a short write.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.shared.target {
            Target::Stdout => io::stdout().lock().flush(),
            Target::Capture(_) => Ok(()),
            Target::Writer(writer) => writer.lock().flush(),
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.shared.target {
            Target::Stdout => "stdout",
            Target::Capture(_) => "capture",
            Target::Writer(_) => "writer",
        };
        f.debug_struct("OutputSink")
            .field("target", &target)
            .field("written", &self.has_written())
            .finish()
    }
}

/// A cloneable in-memory writer, handy as the "real" output in tests.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
