//! Engine configuration.
//!
//! Only the tunable knobs live here. The isolation profile itself
//! (read-only mount, disabled network and IPC, dropped capabilities) is
//! fixed in code and cannot be relaxed by configuration or per request.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Default wall-clock budget per execution, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Default memory ceiling per execution, in megabytes. Swap is pinned
    /// to the same value.
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    /// Max number of PIDs per container (fork bomb protection).
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,
    /// Cap on combined output returned to the caller, in bytes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Ceiling on each free-text input (code or auxiliary file), in bytes.
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
    /// Case-insensitive substrings rejected by the pre-filter.
    #[serde(default = "default_deny_patterns")]
    pub deny_patterns: Vec<String>,
    /// Maximum number of simultaneously running sandboxes. Further
    /// requests wait their turn.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_memory_limit_mb() -> u64 {
    256
}

fn default_pids_limit() -> i64 {
    128
}

fn default_max_output_bytes() -> usize {
    100_000
}

fn default_max_input_bytes() -> usize {
    10_000
}

fn default_max_concurrent() -> usize {
    8
}

fn default_deny_patterns() -> Vec<String> {
    [
        "child_process",
        "process.",
        "exec(",
        "spawn(",
        "fs.write",
        "eval(",
        "function(",
        "require(",
        "import(",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            memory_limit_mb: default_memory_limit_mb(),
            pids_limit: default_pids_limit(),
            max_output_bytes: default_max_output_bytes(),
            max_input_bytes: default_max_input_bytes(),
            deny_patterns: default_deny_patterns(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl SandboxConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: SandboxConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.memory_limit_mb, 256);
        assert_eq!(config.max_input_bytes, 10_000);
        assert!(config.deny_patterns.iter().any(|p| p == "eval("));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: SandboxConfig = toml::from_str(
            r#"
timeout_ms = 30000
memory_limit_mb = 512
"#,
        )
        .unwrap();

        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.memory_limit_mb, 512);
        assert_eq!(config.pids_limit, 128);
        assert_eq!(config.max_output_bytes, 100_000);
        assert_eq!(config.max_concurrent, 8);
    }

    #[test]
    fn deny_patterns_are_overridable() {
        let config: SandboxConfig = toml::from_str(
            r#"
deny_patterns = ["forkbomb"]
"#,
        )
        .unwrap();

        assert_eq!(config.deny_patterns, vec!["forkbomb".to_owned()]);
    }
}
