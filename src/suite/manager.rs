//! Finding, running and reporting the tests of one SDK version.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::config::SuiteConfig;
use crate::error::{Error, Result};
use crate::harness::{ExitStatus, OutputSink};
use crate::suite::case::is_definition;
use crate::suite::render::sanitize_file_name;
use crate::suite::report::format_result;
use crate::suite::{
    CaseRecord, Report, ResultCode, Runner, SnippetCase, TestDefinition, TestFailure,
};

pub struct TestManager {
    sdk: String,
    version: String,
    runner: Runner,
    suite: SuiteConfig,
    console: OutputSink,
    report: Report,
    tests: Vec<PathBuf>,
    records: Vec<CaseRecord>,
}

impl TestManager {
    /// Set up a run of `sdk` at `version`; results are printed to `console`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an SDK without a runner, or an error if
    /// the existing report cannot be read.
    pub fn new(
        sdk: &str,
        version: &str,
        suite: SuiteConfig,
        console: OutputSink,
    ) -> Result<Self> {
        let runner = Runner::resolve(sdk, &suite).ok_or_else(|| {
            Error::Config(format!(
                "Unknown SDK {sdk}. Supported SDKs: {}",
                Runner::supported(&suite).join(", ")
            ))
        })?;
        let report = Report::load(&suite.report_path)?;

        Ok(Self {
            sdk: sdk.to_string(),
            version: version.to_string(),
            runner,
            suite,
            console,
            report,
            tests: Vec::new(),
            records: Vec::new(),
        })
    }

    /// Collect the definitions under `base` that target this SDK version.
    ///
    /// `base` may be a single definition file. Returns how many were found.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` or a directory below it cannot be read.
    pub fn crawl(&mut self, base: &Path) -> Result<usize> {
        let mut found = Vec::new();
        collect(base, &mut found)?;
        found.retain(|path| TestDefinition::targets(path, &self.sdk, &self.version));

        info!(sdk = %self.sdk, version = %self.version, count = found.len(), "crawled tests");
        self.say(&format!("Found {} snippets.\n", found.len()));
        self.tests = found;
        Ok(self.tests.len())
    }

    #[must_use]
    pub fn tests(&self) -> &[PathBuf] {
        &self.tests
    }

    #[must_use]
    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    #[must_use]
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Run every crawled test in order, then write the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be written.
    pub async fn run_all(&mut self) -> Result<ExitStatus> {
        let tests = std::mem::take(&mut self.tests);
        for test in &tests {
            self.run_case(test).await;
        }
        self.tests = tests;

        self.report.write()?;

        let failed = self.records.iter().filter(|r| !r.is_success()).count();
        info!(total = self.records.len(), failed, "suite finished");
        Ok(if failed == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        })
    }

    /// Run one definition, print and record its result.
    pub async fn run_case(&mut self, test_file: &Path) -> &CaseRecord {
        let mut record = CaseRecord {
            name: fallback_name(test_file),
            description: String::new(),
            language: self.sdk.clone(),
            definition: raw_definition(test_file),
            code: ResultCode::Success,
            failure: None,
            file: String::new(),
            rendered: None,
            local_command: None,
        };

        let outcome = self.execute(test_file, &mut record).await;
        match outcome {
            Ok(()) => record.code = ResultCode::Success,
            Err(failure) => {
                record.code = failure.code;
                if let Some(file) = &failure.file {
                    record.file.clone_from(file);
                }
                record.failure = Some(failure);
            }
        }

        let text = format_result(&self.sdk, &record);
        self.print(&text);
        self.report.add(&record);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    async fn execute(
        &self,
        test_file: &Path,
        record: &mut CaseRecord,
    ) -> std::result::Result<(), TestFailure> {
        let definition = TestDefinition::load(test_file)?;
        record.name.clone_from(&definition.name);
        record.description.clone_from(&definition.description);

        let runner = match definition.runner.as_deref() {
            None => self.runner.clone(),
            Some(name) => Runner::resolve(name, &self.suite).ok_or_else(|| {
                TestFailure::new(ResultCode::Error, format!("Unknown runner {name}"))
            })?,
        };

        let case = SnippetCase::build(test_file, definition, &runner, &self.suite.templates_dir)?;
        record.file = case.snippet_file.display().to_string();

        let rendered = self.suite.rendered_dir.join(format!(
            "{}.{}",
            sanitize_file_name(case.name()),
            case.ext
        ));
        record.local_command = Some(runner.local_command(&rendered));
        record.rendered = Some(rendered);

        runner.run(&case, &self.suite).await
    }

    fn say(&mut self, message: &str) {
        let line = format!("[{}]  {message}\n", self.sdk);
        self.print(&line);
    }

    fn print(&mut self, text: &str) {
        if let Err(e) = self
            .console
            .write_all(text.as_bytes())
            .and_then(|()| self.console.flush())
        {
            warn!(error = %e, "could not write to console");
        }
    }
}

impl std::fmt::Debug for TestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestManager")
            .field("sdk", &self.sdk)
            .field("version", &self.version)
            .field("tests", &self.tests.len())
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

fn collect(base: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let meta = std::fs::metadata(base).map_err(|e| Error::Io(format!("{}: {e}", base.display())))?;
    if meta.is_file() {
        if is_definition(base) {
            found.push(base.to_path_buf());
        }
        return Ok(());
    }

    let mut entries = std::fs::read_dir(base)
        .map_err(|e| Error::Io(format!("{}: {e}", base.display())))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect(&path, found)?;
        } else if is_definition(&path) {
            found.push(path);
        }
    }
    Ok(())
}

fn fallback_name(test_file: &Path) -> String {
    test_file
        .file_name()
        .map(|n| n.to_string_lossy().trim_end_matches(".test.yml").to_string())
        .unwrap_or_default()
}

fn raw_definition(test_file: &Path) -> Value {
    std::fs::read_to_string(test_file)
        .ok()
        .and_then(|text| serde_yaml::from_str::<Value>(&text).ok())
        .unwrap_or(Value::Null)
}
