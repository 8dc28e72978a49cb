//! Running a rendered snippet with its SDK's toolchain.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{RunnerConfig, SuiteConfig};
use crate::harness::Watchdog;
use crate::suite::{ResultCode, SnippetCase, TestFailure, expect, render};

/// Placeholder for the rendered file in runner commands.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// SDKs with a built-in runner.
pub const PRESETS: [&str; 2] = ["go", "js"];

/// Toolchain of one SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runner {
    sdk: String,
    config: RunnerConfig,
    run_timeout: Option<Duration>,
}

impl Runner {
    #[must_use]
    pub fn new(sdk: impl Into<String>, config: RunnerConfig) -> Self {
        Self {
            sdk: sdk.into(),
            config,
            run_timeout: None,
        }
    }

    /// Built-in runner for `sdk`, if there is one.
    #[must_use]
    pub fn preset(sdk: &str) -> Option<Self> {
        let args = |parts: &[&str]| parts.iter().map(|p| (*p).to_string()).collect::<Vec<_>>();
        let config = match sdk {
            "js" => RunnerConfig {
                ext: "js".into(),
                command: args(&["node", FILE_PLACEHOLDER]),
                lint: Some(args(&[
                    "./node_modules/.bin/eslint",
                    "-c",
                    "test/linters/eslint.json",
                    FILE_PLACEHOLDER,
                ])),
                prepare: None,
            },
            "go" => RunnerConfig {
                ext: "go".into(),
                command: args(&["go", "run", FILE_PLACEHOLDER]),
                lint: Some(args(&["golint", FILE_PLACEHOLDER])),
                prepare: Some(args(&["goimports", "-w", FILE_PLACEHOLDER])),
            },
            _ => return None,
        };
        Some(Self::new(sdk, config))
    }

    /// Configured runner for `sdk`, falling back to the presets.
    #[must_use]
    pub fn resolve(sdk: &str, suite: &SuiteConfig) -> Option<Self> {
        let runner = match suite.runners.get(sdk) {
            Some(config) => Some(Self::new(sdk, config.clone())),
            None => Self::preset(sdk),
        };
        runner.map(|r| r.with_run_timeout(suite.run_timeout_secs.map(Duration::from_secs)))
    }

    /// Every SDK a runner exists for, sorted.
    #[must_use]
    pub fn supported(suite: &SuiteConfig) -> Vec<String> {
        PRESETS
            .iter()
            .map(|s| (*s).to_string())
            .chain(suite.runners.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[must_use]
    pub const fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    #[must_use]
    pub fn sdk(&self) -> &str {
        &self.sdk
    }

    #[must_use]
    pub fn ext(&self) -> &str {
        &self.config.ext
    }

    /// The run command for `file`, as a user would type it.
    #[must_use]
    pub fn local_command(&self, file: &Path) -> String {
        expand(&self.config.command, file).join(" ")
    }

    /// Render, lint, run and check `case`.
    ///
    /// The `after` hook runs whenever rendering succeeded. On success the
    /// rendered file is removed; on failure it is copied to `failed_dir`.
    ///
    /// # Errors
    ///
    /// The first step that failed, as a [`TestFailure`].
    pub async fn run(&self, case: &SnippetCase, suite: &SuiteConfig) -> Result<(), TestFailure> {
        let rendered = render::write_rendered(case, &suite.rendered_dir)?;
        debug!(sdk = %self.sdk, file = %rendered.display(), "rendered");

        let mut outcome = self.exercise(case, &rendered).await;

        if let Some(after) = &case.definition.hooks.after {
            if let Err(failure) = run_hook(after).await {
                if outcome.is_ok() {
                    outcome = Err(failure);
                } else {
                    warn!(test = case.name(), error = %failure, "after hook failed");
                }
            }
        }

        match outcome {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&rendered).await {
                    warn!(file = %rendered.display(), error = %e, "could not remove rendered file");
                }
                Ok(())
            }
            Err(failure) => {
                save_failed(&rendered, &suite.failed_dir).await;
                Err(failure.with_file(case.snippet_file.display().to_string()))
            }
        }
    }

    async fn exercise(&self, case: &SnippetCase, rendered: &Path) -> Result<(), TestFailure> {
        if let Some(before) = &case.definition.hooks.before {
            run_hook(before).await?;
        }
        self.lint(rendered).await?;
        self.prepare(rendered).await?;

        let output = self.run_snippet(rendered).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let actual = format!(
                "Command failed: {}\n{stderr}",
                self.local_command(rendered)
            );
            return Err(
                TestFailure::new(ResultCode::ErrAssertion, actual).with_output(stdout.into_owned())
            );
        }

        expect::check(
            &expect::output_lines(&stdout, &stderr),
            &case.definition.expectations(),
        )
    }

    async fn lint(&self, file: &Path) -> Result<(), TestFailure> {
        let Some(lint) = &self.config.lint else {
            return Ok(());
        };
        checked(&expand(lint, file))
            .await
            .map_err(|message| TestFailure::new(ResultCode::ErrLinter, message))
    }

    async fn prepare(&self, file: &Path) -> Result<(), TestFailure> {
        let Some(prepare) = &self.config.prepare else {
            return Ok(());
        };
        checked(&expand(prepare, file))
            .await
            .map_err(|message| TestFailure::new(ResultCode::CompilationFail, message))
    }

    async fn run_snippet(&self, file: &Path) -> Result<Output, TestFailure> {
        let argv = expand(&self.config.command, file);
        let spawn_failed =
            |e: std::io::Error| TestFailure::new(ResultCode::ErrAssertion, format!("{}: {e}", argv.join(" ")));

        let mut command = command(&argv).map_err(spawn_failed)?;
        command.kill_on_drop(true);

        match self.run_timeout {
            None => command.output().await.map_err(spawn_failed),
            Some(timeout) => match Watchdog::new(timeout).guard(command.output()).await {
                Ok(output) => output.map_err(spawn_failed),
                Err(elapsed) => Err(TestFailure::new(
                    ResultCode::ErrAssertion,
                    format!("{}: {elapsed}", argv.join(" ")),
                )),
            },
        }
    }
}

fn expand(args: &[String], file: &Path) -> Vec<String> {
    let file = file.display().to_string();
    args.iter()
        .map(|arg| arg.replace(FILE_PLACEHOLDER, &file))
        .collect()
}

fn command(argv: &[String]) -> std::io::Result<Command> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
    })?;
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());
    Ok(command)
}

/// Run `argv` to completion; a spawn failure or non-zero exit yields the
/// combined output as the message.
async fn checked(argv: &[String]) -> Result<(), String> {
    let output = command(argv)
        .map_err(|e| e.to_string())?
        .output()
        .await
        .map_err(|e| format!("{}: {e}", argv.join(" ")))?;
    if output.status.success() {
        return Ok(());
    }
    Err(format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    ))
}

async fn run_hook(script: &str) -> Result<(), TestFailure> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| TestFailure::new(ResultCode::HookFailed, e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(TestFailure::new(
            ResultCode::HookFailed,
            format!("Command failed: {script} ({status})"),
        ))
    }
}

async fn save_failed(rendered: &Path, failed_dir: &Path) {
    let Some(name) = rendered.file_name() else {
        return;
    };
    let target: PathBuf = failed_dir.join(name);
    let copied = match tokio::fs::create_dir_all(failed_dir).await {
        Ok(()) => tokio::fs::copy(rendered, &target).await.map(drop),
        Err(e) => Err(e),
    };
    if let Err(e) = copied {
        warn!(file = %rendered.display(), error = %e, "could not save failed snippet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::TestDefinition;

    fn sh_runner() -> Runner {
        Runner::new(
            "sh",
            RunnerConfig {
                ext: "sh".into(),
                command: vec!["sh".into(), FILE_PLACEHOLDER.into()],
                lint: None,
                prepare: None,
            },
        )
    }

    struct Fixture {
        dir: tempfile::TempDir,
        suite: SuiteConfig,
    }

    impl Fixture {
        fn new(template: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let suite = SuiteConfig {
                templates_dir: dir.path().join("templates"),
                rendered_dir: dir.path().join("bin"),
                failed_dir: dir.path().join("failed"),
                report_path: dir.path().join("report.json"),
                ..SuiteConfig::default()
            };
            std::fs::create_dir_all(&suite.templates_dir).unwrap();
            std::fs::write(suite.templates_dir.join("default.tpl.sh"), template).unwrap();
            Self { dir, suite }
        }

        fn case(&self, runner: &Runner, definition: &str, snippet: &str) -> SnippetCase {
            let test_file = self.dir.path().join("case.test.yml");
            std::fs::write(&test_file, definition).unwrap();
            std::fs::write(self.dir.path().join("case.sh"), snippet).unwrap();
            let definition = TestDefinition::load(&test_file).unwrap();
            SnippetCase::build(&test_file, definition, runner, &self.suite.templates_dir).unwrap()
        }
    }

    const PASSING: &str = "name: Echo Case\ntemplate: default\nexpected: [first, second]\nsdk: sh\nversion: 1\n";

    #[test]
    fn test_presets() {
        let js = Runner::preset("js").unwrap();
        assert_eq!(js.ext(), "js");
        assert_eq!(js.local_command(Path::new("test/bin/a.js")), "node test/bin/a.js");

        let go = Runner::preset("go").unwrap();
        assert_eq!(go.local_command(Path::new("a.go")), "go run a.go");
        assert!(go.config.prepare.is_some());

        assert!(Runner::preset("cobol").is_none());
    }

    #[test]
    fn test_configured_runner_wins_and_lists_supported() {
        let mut suite = SuiteConfig::default();
        suite.runners.insert("js".into(), sh_runner().config);
        suite.runners.insert("sh".into(), sh_runner().config);
        suite.run_timeout_secs = Some(5);

        let js = Runner::resolve("js", &suite).unwrap();
        assert_eq!(js.ext(), "sh");
        assert_eq!(js.run_timeout, Some(Duration::from_secs(5)));
        assert_eq!(Runner::supported(&suite), vec!["go", "js", "sh"]);
    }

    #[tokio::test]
    async fn test_successful_run_removes_rendered_file() {
        let fixture = Fixture::new("set -e\n[snippet-code]\n");
        let runner = sh_runner();
        let case = fixture.case(&runner, PASSING, "echo first\necho second\n");

        runner.run(&case, &fixture.suite).await.unwrap();
        assert!(!fixture.suite.rendered_dir.join("echo_case.sh").exists());
        assert!(!fixture.suite.failed_dir.exists());
    }

    #[tokio::test]
    async fn test_order_failure_keeps_rendered_copy() {
        let fixture = Fixture::new("[snippet-code]\n");
        let runner = sh_runner();
        let case = fixture.case(&runner, PASSING, "echo second\necho first\n");

        let failure = runner.run(&case, &fixture.suite).await.unwrap_err();
        assert_eq!(failure.code, ResultCode::ErrOrder);
        assert!(failure.file.unwrap().ends_with("case.sh"));
        assert!(fixture.suite.failed_dir.join("echo_case.sh").is_file());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_assertion_with_output() {
        let fixture = Fixture::new("[snippet-code]\n");
        let runner = sh_runner();
        let case = fixture.case(&runner, PASSING, "echo partial\necho boom >&2\nexit 3\n");

        let failure = runner.run(&case, &fixture.suite).await.unwrap_err();
        assert_eq!(failure.code, ResultCode::ErrAssertion);
        assert_eq!(failure.output.as_deref(), Some("partial\n"));
        assert!(failure.actual.as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_hooks() {
        let fixture = Fixture::new("[snippet-code]\n");
        let runner = sh_runner();
        let marker = fixture.dir.path().join("after-ran");
        let definition = format!(
            "name: hooked\ntemplate: default\nexpected: first\nsdk: sh\nversion: 1\nhooks:\n  before: exit 1\n  after: touch {}\n",
            marker.display()
        );
        let case = fixture.case(&runner, &definition, "echo first\n");

        let failure = runner.run(&case, &fixture.suite).await.unwrap_err();
        assert_eq!(failure.code, ResultCode::HookFailed);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_lint_and_prepare_failures() {
        let fixture = Fixture::new("[snippet-code]\n");
        let mut runner = sh_runner();
        runner.config.lint = Some(vec!["sh".into(), "-c".into(), "echo bad style; exit 1".into()]);
        let case = fixture.case(&runner, PASSING, "echo first\necho second\n");
        let failure = runner.run(&case, &fixture.suite).await.unwrap_err();
        assert_eq!(failure.code, ResultCode::ErrLinter);
        assert_eq!(failure.actual, "bad style\n");

        runner.config.lint = None;
        runner.config.prepare = Some(vec!["false".into()]);
        let failure = runner.run(&case, &fixture.suite).await.unwrap_err();
        assert_eq!(failure.code, ResultCode::CompilationFail);
    }

    #[tokio::test]
    async fn test_render_failure_skips_after_hook() {
        let fixture = Fixture::new("no tag\n");
        let runner = sh_runner();
        let marker = fixture.dir.path().join("after-ran");
        let definition = format!(
            "name: untagged\ntemplate: default\nexpected: x\nsdk: sh\nversion: 1\nhooks:\n  after: touch {}\n",
            marker.display()
        );
        let case = fixture.case(&runner, &definition, "echo x\n");

        let failure = runner.run(&case, &fixture.suite).await.unwrap_err();
        assert_eq!(failure.code, ResultCode::MissingTag);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let fixture = Fixture::new("[snippet-code]\n");
        let runner = sh_runner().with_run_timeout(Some(Duration::from_millis(200)));
        let case = fixture.case(&runner, PASSING, "sleep 5\n");

        let failure = runner.run(&case, &fixture.suite).await.unwrap_err();
        assert_eq!(failure.code, ResultCode::ErrAssertion);
    }
}
