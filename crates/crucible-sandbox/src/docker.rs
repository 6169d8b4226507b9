//! Container orchestration against the Docker daemon.

use anyhow::{Context, Result};
use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use crucible_core::ExecError;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Working directory inside every sandbox container; the workspace is
/// bind-mounted here read-only as the sole mount.
const CONTAINER_WORKDIR: &str = "/app";

/// Opaque reference to one created container. Bound 1:1 to a workspace and
/// never reused across requests.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Resource ceilings for one execution.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub pids: i64,
}

/// Creates and drives sandbox containers under one fixed isolation profile.
///
/// The profile is non-negotiable: there is no path here to relax it for a
/// single request.
#[derive(Clone)]
pub struct Orchestrator {
    docker: Docker,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Connect to the local Docker daemon and verify it responds.
    ///
    /// Build this once at process start and share it: the handle is cheap
    /// to clone and its lifecycle is owned by the entry point, not by a
    /// module global.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("failed to connect to Docker daemon")?;

        docker
            .ping()
            .await
            .context("Docker daemon did not answer ping")?;

        info!("connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Wrap a pre-configured client (tests, custom transports).
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    pub(crate) fn client(&self) -> Docker {
        self.docker.clone()
    }

    /// Create a container bound read-only to the workspace.
    pub async fn create(
        &self,
        workspace: &Path,
        image: &str,
        command: Vec<String>,
        limits: ResourceLimits,
    ) -> Result<ContainerHandle, ExecError> {
        let name = format!("crucible-{}", Uuid::new_v4());

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{CONTAINER_WORKDIR}:ro",
                workspace.display()
            )]),
            memory: Some(limits.memory_bytes),
            // Swap ceiling equals the memory ceiling, so the limit cannot
            // be evaded by swapping.
            memory_swap: Some(limits.memory_bytes),
            network_mode: Some("none".to_owned()),
            ipc_mode: Some("none".to_owned()),
            cap_drop: Some(vec!["ALL".to_owned()]),
            security_opt: Some(vec!["no-new-privileges".to_owned()]),
            pids_limit: Some(limits.pids),
            auto_remove: Some(true),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(image.to_owned()),
            cmd: Some(command),
            working_dir: Some(CONTAINER_WORKDIR.to_owned()),
            network_disabled: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: Some(name.clone()),
            platform: String::new(),
        };

        let created = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| ExecError::ContainerCreationFailed(e.to_string()))?;

        debug!(container = %name, image, "container created");

        Ok(ContainerHandle {
            id: created.id,
            name,
        })
    }

    pub async fn start(&self, handle: &ContainerHandle) -> Result<(), ExecError> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions>)
            .await
            .map_err(|e| ExecError::Runtime(format!("failed to start container: {e}")))
    }

    /// Wait for the container to stop; returns its exit status.
    pub async fn wait(&self, handle: &ContainerHandle) -> Result<i64, ExecError> {
        let options = WaitContainerOptions {
            condition: "not-running".to_owned(),
        };

        let mut stream = self.docker.wait_container(&handle.id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(e)) => Err(ExecError::Runtime(format!("container wait failed: {e}"))),
            None => Err(ExecError::Runtime(
                "container wait stream closed unexpectedly".to_owned(),
            )),
        }
    }

    /// Force-stop a container immediately. A container that already exited
    /// (or was auto-removed) is fine; the error is logged and swallowed.
    pub async fn stop(&self, handle: &ContainerHandle) {
        let options = StopContainerOptions {
            t: Some(0),
            signal: None,
        };

        if let Err(e) = self.docker.stop_container(&handle.id, Some(options)).await {
            debug!(container = %handle.name, error = %e, "stop: container already stopped or gone");
        }
    }

    /// Force-remove a container. Idempotent: a missing container means
    /// auto-remove already took it.
    pub async fn remove(&self, handle: &ContainerHandle) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        if let Err(e) = self
            .docker
            .remove_container(&handle.id, Some(options))
            .await
        {
            debug!(container = %handle.name, error = %e, "remove: container already gone");
        }
    }
}

/// Drain the container's combined output stream into the shared buffer.
///
/// Takes an owned client so it can run as a spawned task alongside the
/// waiter; the stream follows output until the container stops or the
/// task is aborted.
pub(crate) async fn collect_logs(
    docker: Docker,
    container_id: String,
    buffer: Arc<tokio::sync::Mutex<String>>,
) {
    let options = LogsOptions {
        follow: true,
        stdout: true,
        stderr: true,
        tail: "all".to_owned(),
        ..Default::default()
    };

    let mut stream = docker.logs(&container_id, Some(options));
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => buffer.lock().await.push_str(&chunk.to_string()),
            Err(e) => {
                debug!(container = %container_id, error = %e, "log stream ended");
                break;
            }
        }
    }
}
