//! Agent-facing tool wrapper around the engine.

use crate::engine::Engine;
use anyhow::Result;
use async_trait::async_trait;
use crucible_core::{ExecutionRequest, Language, Tool, ToolDef, ToolOutput};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct CodeInterpreterTool {
    engine: Arc<Engine>,
}

impl CodeInterpreterTool {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": ["python", "javascript", "typescript", "rust", "go"],
                    "description": "Language to execute"
                },
                "code": {
                    "type": "string",
                    "description": "Code to execute"
                },
                "files": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Additional files, keyed by path relative to the workspace"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Execution time budget in milliseconds"
                },
                "memory_limit_mb": {
                    "type": "integer",
                    "description": "Memory ceiling in megabytes"
                }
            },
            "required": ["language", "code"]
        })
    }
}

#[async_trait]
impl Tool for CodeInterpreterTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "code_interpreter",
            "Execute code in an isolated container and return its output",
            Self::schema(),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput> {
        let language_tag = arguments
            .get("language")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing required parameter: language"))?;

        let code = arguments
            .get("code")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing required parameter: code"))?;

        // An unknown tag is a result, not a fault, and nothing is
        // allocated for it.
        let language = match Language::from_str(language_tag) {
            Ok(language) => language,
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };

        let mut request = ExecutionRequest::new(language, code);

        if let Some(files) = arguments.get("files").and_then(serde_json::Value::as_object) {
            for (path, content) in files {
                let Some(text) = content.as_str() else {
                    return Ok(ToolOutput::error(format!(
                        "file {path} must be a string"
                    )));
                };
                request = request.with_file(path.as_str(), text);
            }
        }

        if let Some(ms) = arguments
            .get("timeout_ms")
            .and_then(serde_json::Value::as_u64)
        {
            request = request.with_timeout(Duration::from_millis(ms));
        }

        if let Some(mb) = arguments
            .get("memory_limit_mb")
            .and_then(serde_json::Value::as_u64)
        {
            request = request.with_memory_limit_mb(mb);
        }

        debug!(
            language = %language,
            code_len = code.len(),
            files = request.files.len(),
            "code_interpreter invoked"
        );

        let result = self.engine.execute(&request).await;

        if result.error {
            Ok(ToolOutput::error(result.output))
        } else if result.output.is_empty() {
            Ok(ToolOutput::success("(no output)"))
        } else {
            Ok(ToolOutput::success(result.output))
        }
    }
}
