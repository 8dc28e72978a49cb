//! `*.test.yml` test definitions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::suite::{ResultCode, TestFailure};

/// Shell commands run around a test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// One pattern or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    One(String),
    Many(Vec<String>),
}

impl Default for Expected {
    fn default() -> Self {
        Expected::Many(Vec::new())
    }
}

impl Expected {
    #[must_use]
    pub fn patterns(&self) -> Vec<String> {
        match self {
            Expected::One(pattern) => vec![pattern.clone()],
            Expected::Many(patterns) => patterns.clone(),
        }
    }
}

/// SDK versions are written either as strings or as numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Version {
    Text(String),
    Number(serde_yaml::Number),
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Version::Text(s) => f.write_str(s),
            Version::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hooks: Hooks,
    pub template: String,
    #[serde(default)]
    pub expected: Expected,
    pub sdk: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
}

/// Just enough of a definition to decide whether it belongs to a run.
#[derive(Debug, Default, Deserialize)]
struct Target {
    sdk: Option<String>,
    version: Option<Version>,
}

impl TestDefinition {
    /// Parse definition text. The first `#` in the name is dropped.
    ///
    /// # Errors
    ///
    /// `MISSING_TEST_DESCRIPTION` for an empty document, `ERROR` for YAML
    /// that does not describe a test.
    pub fn parse(text: &str) -> Result<Self, TestFailure> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| TestFailure::new(ResultCode::Error, e.to_string()))?;
        let empty = match &raw {
            serde_yaml::Value::Null => true,
            serde_yaml::Value::Mapping(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            return Err(TestFailure::new(
                ResultCode::MissingTestDescription,
                "Missing or empty test.yml file",
            ));
        }

        let mut definition: TestDefinition = serde_yaml::from_value(raw)
            .map_err(|e| TestFailure::new(ResultCode::Error, e.to_string()))?;
        definition.name = definition.name.replacen('#', "", 1);
        Ok(definition)
    }

    /// Read and parse a definition file.
    ///
    /// # Errors
    ///
    /// `MISSING_TEST_DESCRIPTION` when the file is missing or empty, plus
    /// the errors of [`TestDefinition::parse`].
    pub fn load(path: &Path) -> Result<Self, TestFailure> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TestFailure::new(
                ResultCode::MissingTestDescription,
                format!("Missing or empty test.yml file: {}: {e}", path.display()),
            )
        })?;
        Self::parse(&text)
    }

    /// Whether the file at `path` targets `sdk` at `version`.
    ///
    /// Unreadable or empty files target nothing.
    #[must_use]
    pub fn targets(path: &Path, sdk: &str, version: &str) -> bool {
        let Ok(text) = std::fs::read_to_string(path) else {
            return false;
        };
        let target: Target = serde_yaml::from_str(&text).unwrap_or_default();
        target.sdk.as_deref() == Some(sdk)
            && target.version.is_some_and(|v| v.to_string() == version)
    }

    #[must_use]
    pub fn expectations(&self) -> Vec<String> {
        self.expected.patterns()
    }
}
