//! Failure taxonomy for the execution pipeline.
//!
//! Timeouts and nonzero exits are deliberately absent: they are terminal
//! outcome classifications carried by [`crate::ExecutionResult`], not
//! errors. Everything here is a reason an execution was refused or could
//! not be carried out.

use crate::types::Outcome;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Input failed the static pre-filter (size ceiling or deny-list).
    #[error("input rejected: {0}")]
    InputRejected(String),

    /// An auxiliary file path would resolve outside the workspace root.
    #[error("path traversal blocked: {0}")]
    PathTraversal(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Image provenance could not be confirmed (or the scan could not be
    /// completed; inconclusive checks fail closed).
    #[error("untrusted image {image}: {reason}")]
    UntrustedImage { image: String, reason: String },

    /// The scan matched a known-critical CVE.
    #[error("vulnerable image {image}: {cve}")]
    VulnerableImage { image: String, cve: String },

    #[error("container creation failed: {0}")]
    ContainerCreationFailed(String),

    /// Fault from the container runtime or filesystem after validation
    /// passed (staging I/O, start, wait).
    #[error("execution runtime error: {0}")]
    Runtime(String),
}

impl ExecError {
    /// The terminal classification recorded when this failure ends an
    /// execution.
    pub fn outcome(&self) -> Outcome {
        match self {
            ExecError::ContainerCreationFailed(_) | ExecError::Runtime(_) => {
                Outcome::CreationFailed
            }
            ExecError::InputRejected(_)
            | ExecError::PathTraversal(_)
            | ExecError::UnsupportedLanguage(_)
            | ExecError::UntrustedImage { .. }
            | ExecError::VulnerableImage { .. } => Outcome::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals_classify_as_rejected() {
        assert_eq!(
            ExecError::InputRejected("too long".to_owned()).outcome(),
            Outcome::Rejected
        );
        assert_eq!(
            ExecError::PathTraversal("../etc/passwd".to_owned()).outcome(),
            Outcome::Rejected
        );
        assert_eq!(
            ExecError::UnsupportedLanguage("cobol".to_owned()).outcome(),
            Outcome::Rejected
        );
    }

    #[test]
    fn runtime_faults_classify_as_creation_failed() {
        assert_eq!(
            ExecError::ContainerCreationFailed("daemon unreachable".to_owned()).outcome(),
            Outcome::CreationFailed
        );
        assert_eq!(
            ExecError::Runtime("wait stream closed".to_owned()).outcome(),
            Outcome::CreationFailed
        );
    }
}
