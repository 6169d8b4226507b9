//! Static pre-filter over request text.
//!
//! This is a cheap early rejection of obviously hostile payloads, not a
//! security boundary: trivial obfuscation defeats substring matching. The
//! container isolation profile is what actually contains the code. The
//! filter exists so that plainly bad requests are refused before any
//! workspace or container is allocated.

use crucible_core::ExecError;

#[derive(Debug, Clone)]
pub struct SecurityValidator {
    max_input_bytes: usize,
    /// Stored lowercase; matching is case-insensitive.
    deny_patterns: Vec<String>,
}

impl SecurityValidator {
    pub fn new(max_input_bytes: usize, deny_patterns: &[String]) -> Self {
        Self {
            max_input_bytes,
            deny_patterns: deny_patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Check one free-text input. Synchronous and side-effect-free.
    pub fn validate(&self, text: &str) -> Result<(), ExecError> {
        if text.len() > self.max_input_bytes {
            return Err(ExecError::InputRejected(format!(
                "input exceeds {} bytes",
                self.max_input_bytes
            )));
        }

        let lower = text.to_lowercase();
        for pattern in &self.deny_patterns {
            if lower.contains(pattern.as_str()) {
                return Err(ExecError::InputRejected(format!(
                    "blocked pattern: {pattern}"
                )));
            }
        }

        Ok(())
    }
}
