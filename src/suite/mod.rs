//! Documentation test suite.
//!
//! Each `*.test.yml` definition names a template and sits next to a snippet
//! file. The suite renders the snippet into the template, runs it with the
//! SDK's runner, matches its output against the expected patterns and
//! records the outcome in a JSON report.

pub mod case;
pub mod definition;
pub mod expect;
pub mod manager;
pub mod render;
pub mod report;
pub mod runner;

pub use case::SnippetCase;
pub use definition::{Expected, Hooks, TestDefinition};
pub use manager::TestManager;
pub use report::{Report, ReportEntry};
pub use runner::Runner;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Outcome code of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Success,
    Error,
    MissingTestDescription,
    MissingTemplate,
    MissingSnippet,
    MissingTag,
    MissingGeneratedFile,
    ErrAssertion,
    ErrOrder,
    ErrLinter,
    HookFailed,
    CompilationFail,
}

impl ResultCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ResultCode::Success => "SUCCESS",
            ResultCode::Error => "ERROR",
            ResultCode::MissingTestDescription => "MISSING_TEST_DESCRIPTION",
            ResultCode::MissingTemplate => "MISSING_TEMPLATE",
            ResultCode::MissingSnippet => "MISSING_SNIPPET",
            ResultCode::MissingTag => "MISSING_TAG",
            ResultCode::MissingGeneratedFile => "MISSING_GENERATED_FILE",
            ResultCode::ErrAssertion => "ERR_ASSERTION",
            ResultCode::ErrOrder => "ERR_ORDER",
            ResultCode::ErrLinter => "ERR_LINTER",
            ResultCode::HookFailed => "HOOK_FAILED",
            ResultCode::CompilationFail => "COMPILATION_FAIL",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a test case did not succeed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {}", got_text(.actual))]
pub struct TestFailure {
    pub code: ResultCode,
    /// What was observed: a message, or the output lines.
    pub actual: Value,
    /// The pattern that did not match.
    pub expected: Option<String>,
    /// `[previous, current]` for order violations.
    pub order: Option<[String; 2]>,
    /// Standard output of a failed run.
    pub output: Option<String>,
    /// Snippet file the failure belongs to.
    pub file: Option<String>,
}

impl TestFailure {
    #[must_use]
    pub fn new(code: ResultCode, actual: impl Into<Value>) -> Self {
        Self {
            code,
            actual: actual.into(),
            expected: None,
            order: None,
            output: None,
            file: None,
        }
    }

    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    #[must_use]
    pub fn with_order(mut self, previous: impl Into<String>, current: impl Into<String>) -> Self {
        self.order = Some([previous.into(), current.into()]);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl From<crate::Error> for TestFailure {
    fn from(err: crate::Error) -> Self {
        TestFailure::new(ResultCode::Error, err.to_string())
    }
}

fn got_text(actual: &Value) -> String {
    match actual {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result of one test case as the manager records it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub name: String,
    pub description: String,
    /// SDK the case ran with.
    pub language: String,
    /// The definition as read, or `null` if it could not be read.
    pub definition: Value,
    pub code: ResultCode,
    pub failure: Option<TestFailure>,
    /// Snippet file, empty when the case failed before it was located.
    pub file: String,
    /// Where the rendered snippet was written.
    pub rendered: Option<PathBuf>,
    /// How to run the rendered snippet by hand.
    pub local_command: Option<String>,
}

impl CaseRecord {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success
    }
}
