//! A test definition resolved against its template and snippet files.

use std::path::{Path, PathBuf};

use crate::suite::runner::Runner;
use crate::suite::{ResultCode, TestDefinition, TestFailure};

const DEFINITION_SUFFIX: &str = ".test.yml";

/// Everything needed to render and run one test.
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetCase {
    pub definition: TestDefinition,
    pub test_file: PathBuf,
    pub template_file: PathBuf,
    pub snippet_file: PathBuf,
    /// Snippet text with one trailing newline removed.
    pub snippet: String,
    /// File extension of the runner (`js`, `go`, ...).
    pub ext: String,
}

impl SnippetCase {
    /// Resolve `test_file` for `runner`.
    ///
    /// # Errors
    ///
    /// `MISSING_TEST_DESCRIPTION`, `MISSING_TEMPLATE` or `MISSING_SNIPPET`.
    pub fn build(
        test_file: &Path,
        definition: TestDefinition,
        runner: &Runner,
        templates_dir: &Path,
    ) -> Result<Self, TestFailure> {
        let ext = runner.ext().to_string();

        let template_file = templates_dir.join(format!("{}.tpl.{ext}", definition.template));
        if !template_file.is_file() {
            return Err(TestFailure::new(
                ResultCode::MissingTemplate,
                format!("Missing template file: {}", template_file.display()),
            ));
        }

        let snippet_file = snippet_path(test_file, &ext);
        let mut snippet = std::fs::read_to_string(&snippet_file).map_err(|_| {
            TestFailure::new(
                ResultCode::MissingSnippet,
                format!("Missing snippet file: {}", snippet_file.display()),
            )
        })?;
        if snippet.ends_with('\n') {
            snippet.pop();
        }

        Ok(Self {
            definition,
            test_file: test_file.to_path_buf(),
            template_file,
            snippet_file,
            snippet,
            ext,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// `foo/create.test.yml` becomes `foo/create.<ext>`.
#[must_use]
pub fn snippet_path(test_file: &Path, ext: &str) -> PathBuf {
    let file_name = test_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .strip_suffix(DEFINITION_SUFFIX)
        .unwrap_or(&file_name);
    test_file.with_file_name(format!("{stem}.{ext}"))
}

/// Whether `path` names a test definition.
#[must_use]
pub fn is_definition(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().ends_with(DEFINITION_SUFFIX))
}
