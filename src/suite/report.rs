//! JSON report and console lines.

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::suite::{CaseRecord, ResultCode};

/// Indent of the failure detail lines.
const DETAIL: &str = "        ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Fail,
}

/// One test in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub status: Status,
    pub language: String,
    pub test: Value,
    pub datetime: String,
    /// `{code, got}` for failures, `{}` otherwise.
    pub error: Value,
    pub file: String,
}

impl ReportEntry {
    #[must_use]
    pub fn from_record(record: &CaseRecord) -> Self {
        let error = match &record.failure {
            Some(failure) if !record.is_success() => json!({
                "code": failure.code,
                "got": failure.actual,
            }),
            _ => json!({}),
        };
        Self {
            status: if record.is_success() {
                Status::Success
            } else {
                Status::Fail
            },
            language: record.language.clone(),
            test: record.definition.clone(),
            datetime: chrono::Local::now()
                .format("%-m/%-d/%Y, %-I:%M:%S %p")
                .to_string(),
            error,
            file: record.file.clone(),
        }
    }
}

/// Results keyed by test name, merged into whatever the file already held.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl Report {
    /// Load the report at `path`. A missing file or one that is not a JSON
    /// object starts an empty report.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable report, starting fresh");
                    Map::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(Error::Io(format!("{}: {e}", path.display()))),
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<ReportEntry> {
        self.entries
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Record `record`, replacing an entry of the same name. Returns whether
    /// the name was already present.
    pub fn add(&mut self, record: &CaseRecord) -> bool {
        let entry = ReportEntry::from_record(record);
        let value = serde_json::to_value(entry).unwrap_or(Value::Null);
        let duplicate = self.entries.insert(record.name.clone(), value).is_some();
        if duplicate {
            warn!(name = %record.name, "duplicate snippet name");
        }
        duplicate
    }

    /// Write the report, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, text)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "report written");
        Ok(())
    }
}

fn shown(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Console lines for one result.
#[must_use]
pub fn format_result(sdk: &str, record: &CaseRecord) -> String {
    let prefix = format!("[{sdk}] ");
    let mut out = String::new();

    if record.is_success() {
        let _ = writeln!(out, "{prefix} ✔ {}: {}", record.name, record.description);
        return out;
    }

    let _ = writeln!(out, "{prefix} ✗ {}: {}", record.name, record.description);
    let _ = writeln!(out, "{DETAIL}CODE    : {}", record.code);
    let _ = writeln!(out, "{DETAIL}FILE    : {}", record.file);

    if let Some(failure) = &record.failure {
        match failure.code {
            ResultCode::ErrAssertion => {
                if let Some(output) = failure.output.as_deref().filter(|o| !o.is_empty()) {
                    let _ = writeln!(out, "{DETAIL}OUTPUT  : {output}");
                }
                let expected = failure.expected.clone().unwrap_or_else(|| {
                    record
                        .definition
                        .get("expected")
                        .map(shown)
                        .unwrap_or_default()
                });
                let _ = writeln!(out, "{DETAIL}EXPECTED: {expected}");
                let _ = writeln!(out, "{DETAIL}GOT     : {}", shown(&failure.actual));
            }
            ResultCode::ErrOrder => {
                let [previous, current] = failure.order.clone().unwrap_or_default();
                let _ = writeln!(out, "{DETAIL}THIS RESULT: {previous}");
                let _ = writeln!(out, "{DETAIL}CAME BEFORE: {current}");
                let _ = writeln!(out, "{DETAIL}COMPLETE OUTPUT: {}", shown(&failure.actual));
            }
            _ => {
                let _ = writeln!(out, "{DETAIL}ERROR   : {}", shown(&failure.actual));
            }
        }
    }

    if let Some(rendered) = &record.rendered {
        let _ = writeln!(
            out,
            "{prefix} Check linter error: cat -n {} | less",
            rendered.display()
        );
    }
    if let Some(command) = &record.local_command {
        let _ = writeln!(out, "{prefix} Run snippet: {command}");
    }
    out
}
