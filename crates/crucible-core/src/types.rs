use crate::error::ExecError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Languages the engine can execute.
///
/// This is a closed set: adding a language is a compile-time change, and
/// every dispatch over it is an exhaustive `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Go => "go",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::JavaScript),
            "typescript" => Ok(Language::TypeScript),
            "rust" => Ok(Language::Rust),
            "go" => Ok(Language::Go),
            other => Err(ExecError::UnsupportedLanguage(other.to_owned())),
        }
    }
}

/// A single code-execution request. Immutable once accepted.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: Language,
    /// Source text for the language's canonical main file.
    pub code: String,
    /// Auxiliary files, keyed by path relative to the workspace root.
    pub files: HashMap<String, String>,
    /// Wall-clock budget for the run. `None` applies the configured default.
    pub timeout: Option<Duration>,
    /// Memory ceiling in megabytes. `None` applies the configured default.
    pub memory_limit_mb: Option<u64>,
}

impl ExecutionRequest {
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self {
            language,
            code: code.into(),
            files: HashMap::new(),
            timeout: None,
            memory_limit_mb: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = Some(limit);
        self
    }
}

/// Terminal classification of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    NonZeroExit(i64),
    TimedOut,
    CreationFailed,
    Rejected,
}

/// What the caller gets back from an execution.
///
/// Every failure mode is encoded as descriptive text with `error = true`;
/// the engine never surfaces an unhandled fault to the calling agent.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Combined stdout/stderr, possibly truncated.
    pub output: String,
    pub error: bool,
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: false,
            outcome: Outcome::Success,
        }
    }

    pub fn failure(outcome: Outcome, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: true,
            outcome,
        }
    }
}

/// A tool definition surfaced to the calling agent (name, description,
/// JSON schema for the arguments).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}
