//! Contract between the engine and the calling agent.
//!
//! The agent runtime (planner, registry, response generation) lives
//! elsewhere; it sees capabilities only through this trait.

use crate::types::{ToolDef, ToolOutput};
use anyhow::Result;
use async_trait::async_trait;

/// A capability exposed to the calling agent.
///
/// Implementations report their own failures through
/// [`ToolOutput::error`]; an `Err` from `execute` means the arguments were
/// malformed, not that the underlying operation failed.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool definition (name, description, parameter schema).
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput>;
}
