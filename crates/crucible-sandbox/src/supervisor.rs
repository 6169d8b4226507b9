//! Timeout enforcement, output capture, and guaranteed container cleanup.

use crate::docker::{ContainerHandle, Orchestrator, collect_logs};
use crucible_core::truncate::truncate_tail;
use crucible_core::{ExecutionResult, Outcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// How long to let the follow stream drain after the container exits.
const LOG_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Drives one created container to a terminal outcome.
#[derive(Debug)]
pub struct ExecutionSupervisor {
    orchestrator: Orchestrator,
    max_output_bytes: usize,
}

impl ExecutionSupervisor {
    pub fn new(orchestrator: Orchestrator, max_output_bytes: usize) -> Self {
        Self {
            orchestrator,
            max_output_bytes,
        }
    }

    /// Start the container and race its completion against the timeout.
    ///
    /// Whatever happens inside (completion, timeout, or a runtime fault),
    /// the container is stopped and removed before this returns. Both
    /// teardown calls tolerate a container that is already gone, so the
    /// cleanup is safe to repeat.
    pub async fn run(&self, handle: &ContainerHandle, timeout: Duration) -> ExecutionResult {
        let result = self.run_inner(handle, timeout).await;

        self.orchestrator.stop(handle).await;
        self.orchestrator.remove(handle).await;

        result
    }

    async fn run_inner(&self, handle: &ContainerHandle, timeout: Duration) -> ExecutionResult {
        if let Err(e) = self.orchestrator.start(handle).await {
            return ExecutionResult::failure(Outcome::CreationFailed, e.to_string());
        }

        let buffer = Arc::new(Mutex::new(String::new()));
        let mut collector = tokio::spawn(collect_logs(
            self.orchestrator.client(),
            handle.id.clone(),
            Arc::clone(&buffer),
        ));

        match tokio::time::timeout(timeout, self.orchestrator.wait(handle)).await {
            Err(_) => {
                debug!(container = %handle.name, ?timeout, "execution timed out");
                collector.abort();
                // Non-cooperative cancellation: code inside the sandbox is
                // not asked to stop, the container is killed from outside.
                self.orchestrator.stop(handle).await;
                ExecutionResult::failure(
                    Outcome::TimedOut,
                    format!("execution timed out after {}ms", timeout.as_millis()),
                )
            }
            Ok(Err(e)) => {
                collector.abort();
                ExecutionResult::failure(Outcome::CreationFailed, e.to_string())
            }
            Ok(Ok(status_code)) => {
                if tokio::time::timeout(LOG_DRAIN_GRACE, &mut collector)
                    .await
                    .is_err()
                {
                    collector.abort();
                }
                let output = buffer.lock().await.clone();
                self.classify(status_code, &output)
            }
        }
    }

    fn classify(&self, status_code: i64, output: &str) -> ExecutionResult {
        let truncated = truncate_tail(output, self.max_output_bytes);
        let body = if truncated.was_truncated {
            format!(
                "[output truncated: showing last {} of {} bytes]\n{}",
                truncated.output.len(),
                truncated.total_bytes,
                truncated.output
            )
        } else {
            truncated.output
        };

        if status_code == 0 {
            ExecutionResult::success(body)
        } else {
            debug!(status_code, "nonzero exit");
            ExecutionResult::failure(
                Outcome::NonZeroExit(status_code),
                format!("Process exited with code {status_code}\n{body}"),
            )
        }
    }
}
