//! The ordered execution pipeline.

use crate::config::SandboxConfig;
use crate::docker::{Orchestrator, ResourceLimits};
use crate::gate::{DockerInspector, TrivyScanner, VulnerabilityGate};
use crate::images::{self, ImageSpec};
use crate::supervisor::ExecutionSupervisor;
use crate::validator::SecurityValidator;
use crate::workspace::Workspace;
use crucible_core::{ExecError, ExecutionRequest, ExecutionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Sandboxed code-execution engine.
///
/// One instance serves many concurrent executions: `execute` takes
/// `&self`, and independent requests never share a workspace, container,
/// or scratch state. The only cross-request state is the image trust
/// cache inside the gate.
pub struct Engine {
    config: SandboxConfig,
    validator: SecurityValidator,
    gate: VulnerabilityGate,
    orchestrator: Orchestrator,
    supervisor: ExecutionSupervisor,
    /// Bounds the number of simultaneously running sandboxes.
    limiter: Semaphore,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine with the production gate (Docker image inspection
    /// plus the trivy scanner) around an already-connected orchestrator.
    pub fn new(orchestrator: Orchestrator, config: SandboxConfig) -> Self {
        let gate = VulnerabilityGate::new(
            Arc::new(DockerInspector::new(orchestrator.client())),
            Arc::new(TrivyScanner),
        );
        Self::with_gate(orchestrator, gate, config)
    }

    /// Build an engine around a custom trust gate (alternate scanners,
    /// fakes in tests).
    pub fn with_gate(
        orchestrator: Orchestrator,
        gate: VulnerabilityGate,
        config: SandboxConfig,
    ) -> Self {
        let validator = SecurityValidator::new(config.max_input_bytes, &config.deny_patterns);
        let supervisor = ExecutionSupervisor::new(orchestrator.clone(), config.max_output_bytes);
        let limiter = Semaphore::new(config.max_concurrent);
        Self {
            config,
            validator,
            gate,
            orchestrator,
            supervisor,
            limiter,
        }
    }

    pub fn gate(&self) -> &VulnerabilityGate {
        &self.gate
    }

    /// Run one request end to end.
    ///
    /// Never returns an error: every failure mode is reported as a result
    /// with `error = true`, so the calling agent always receives something
    /// usable.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        match self.run_pipeline(request).await {
            Ok(result) => result,
            Err(e) => {
                info!(language = %request.language, error = %e, "execution did not run to completion");
                ExecutionResult::failure(e.outcome(), e.to_string())
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecError> {
        // Static pre-filter: nothing is allocated before this passes.
        self.validator.validate(&request.code)?;
        for content in request.files.values() {
            self.validator.validate(content)?;
        }

        // Resolution is pure and also precedes any allocation.
        let spec = images::resolve(request.language);

        // Throttle from here: rejected requests never queue, but staging
        // and container work count against the concurrency bound.
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| ExecError::Runtime(format!("executor unavailable: {e}")))?;

        let workspace = Workspace::stage(request, spec.main_file).await?;
        let result = self.run_staged(request, spec, &workspace).await;

        // The workspace never outlives its execution, on any path. The
        // drop impl backstops this if close itself is skipped by a panic.
        workspace.close();

        result
    }

    async fn run_staged(
        &self,
        request: &ExecutionRequest,
        spec: ImageSpec,
        workspace: &Workspace,
    ) -> Result<ExecutionResult, ExecError> {
        self.gate.ensure_trusted(spec.image).await?;

        let timeout = request
            .timeout
            .unwrap_or_else(|| Duration::from_millis(self.config.timeout_ms));
        let memory_mb = request
            .memory_limit_mb
            .unwrap_or(self.config.memory_limit_mb);
        let limits = ResourceLimits {
            memory_bytes: i64::try_from(memory_mb.saturating_mul(1024 * 1024))
                .unwrap_or(i64::MAX),
            pids: self.config.pids_limit,
        };

        let handle = self
            .orchestrator
            .create(workspace.root(), spec.image, spec.command_vec(), limits)
            .await?;

        debug!(
            container = %handle.name,
            language = %request.language,
            ?timeout,
            "sandbox ready"
        );

        Ok(self.supervisor.run(&handle, timeout).await)
    }
}
