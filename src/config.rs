//! Configuration: transport limits, connection settings and harness settings.
//!
//! [`Limits`] and [`Config`] govern a single WebSocket connection.
//! [`HarnessConfig`] is what a run of the harness reads from a TOML file,
//! the environment and the command line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default service host, as resolved inside the test network.
pub const DEFAULT_HOST: &str = "kuzzle";

/// Default service port.
pub const DEFAULT_PORT: u16 = 7512;

/// Default watchdog delay.
pub const DEFAULT_WATCHDOG_SECS: u64 = 30;

/// Default size of the output capture buffer.
pub const DEFAULT_CAPTURE_LIMIT: usize = 4096;

/// Configuration limits for WebSocket connections.
///
/// These limits prevent resource exhaustion and ensure bounded memory usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes, after reassembly.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the handshake response head in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            Err(Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`] if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<()> {
        if count > self.max_fragment_count {
            Err(Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Accept unmasked frames from clients (server only).
    ///
    /// Default: false
    pub accept_unmasked_frames: bool,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Write buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub write_buffer_size: usize,

    /// Maximum time for TCP connect plus handshake. `None` waits forever.
    ///
    /// Default: 10 seconds
    pub connect_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            accept_unmasked_frames: false,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set write buffer size.
    #[must_use]
    pub const fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Configure for server role (used by test fixtures).
    #[must_use]
    pub fn server() -> Self {
        Self {
            accept_unmasked_frames: false,
            ..Default::default()
        }
    }

    /// Configure for client role.
    #[must_use]
    pub fn client() -> Self {
        Self::default()
    }
}

/// How the suite runs snippets of one SDK.
///
/// `{file}` in any argument is replaced by the rendered snippet path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// File extension of snippets and templates (`js`, `go`, ...).
    pub ext: String,
    /// Command running the rendered snippet.
    pub command: Vec<String>,
    /// Optional linter invocation.
    #[serde(default)]
    pub lint: Option<Vec<String>>,
    /// Optional step before running (formatting, compiling).
    #[serde(default)]
    pub prepare: Option<Vec<String>>,
}

/// Directories and runners of the documentation test suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Where `<template>.tpl.<ext>` files live.
    pub templates_dir: PathBuf,
    /// Where rendered snippets are written.
    pub rendered_dir: PathBuf,
    /// Where failing rendered snippets are kept for inspection.
    pub failed_dir: PathBuf,
    /// JSON report location.
    pub report_path: PathBuf,
    /// Upper bound for a single snippet run, in seconds.
    pub run_timeout_secs: Option<u64>,
    /// Runners by SDK name, in addition to the built-in presets.
    pub runners: BTreeMap<String, RunnerConfig>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("test/templates"),
            rendered_dir: PathBuf::from("test/bin"),
            failed_dir: PathBuf::from("reports/failed"),
            report_path: PathBuf::from("reports/report.json"),
            run_timeout_secs: None,
            runners: BTreeMap::new(),
        }
    }
}

/// Settings of a harness run.
///
/// ```toml
/// host = "localhost"
/// port = 7512
/// watchdog_secs = 30
/// capture_limit = 4096
///
/// [suite]
/// templates_dir = "test/templates"
/// run_timeout_secs = 60
///
/// [suite.runners.js]
/// ext = "js"
/// command = ["node", "{file}"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Service host.
    pub host: String,
    /// Service port.
    pub port: u16,
    /// TCP connect plus handshake timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Watchdog delay for realtime templates, in seconds.
    pub watchdog_secs: u64,
    /// Capture buffer size in bytes.
    pub capture_limit: usize,
    /// Documentation test suite settings.
    pub suite: SuiteConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_secs: 10,
            watchdog_secs: DEFAULT_WATCHDOG_SECS,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            suite: SuiteConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML for this shape.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Apply `KUZZLE_HOST` and `KUZZLE_PORT` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `KUZZLE_PORT` is not a port number.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the port override is not a port number.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("KUZZLE_HOST").filter(|h| !h.is_empty()) {
            self.host = host;
        }
        if let Some(port) = lookup("KUZZLE_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid KUZZLE_PORT: {port}")))?;
        }
        Ok(self)
    }

    /// `host:port` of the service.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Watchdog delay.
    #[must_use]
    pub const fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    /// Connection configuration derived from these settings.
    #[must_use]
    pub fn connection_config(&self) -> Config {
        let timeout = (self.connect_timeout_secs > 0)
            .then(|| Duration::from_secs(self.connect_timeout_secs));
        Config::client().with_connect_timeout(timeout)
    }
}
