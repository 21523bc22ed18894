// src/process/manager.rs
use crate::config::ProgramConfig;
use crate::proxy::{Backend, BackendRegistry};
use anyhow::{bail, Context, Result};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

/// Supervises the local child processes backing the backend entries:
/// build-if-missing, spawn with the listening port injected via `PORT`,
/// forced stop, and kill-everything on shutdown.
pub struct ProcessManager {
    registry: Arc<BackendRegistry>,
    program: ProgramConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Backend '{0}' not found")]
    NotFound(String),

    #[error("Backend '{0}' is not running")]
    NotRunning(String),

    #[error("Backend build failed: {0}")]
    Build(String),

    #[error("Failed to spawn backend process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to kill backend process: {0}")]
    Kill(#[source] std::io::Error),
}

impl ProcessManager {
    pub fn new(registry: Arc<BackendRegistry>, program: ProgramConfig) -> Self {
        Self { registry, program }
    }

    /// Start a backend by name, terminating a still-running instance first,
    /// so the same entry point covers first start and restart.
    pub async fn start(&self, name: &str) -> Result<(), ProcessError> {
        let backend = self
            .registry
            .get_backend(name)
            .ok_or_else(|| ProcessError::NotFound(name.to_string()))?;

        if let Some(child) = backend.detach_process().await {
            backend.mark_unhealthy();
            kill_child(&backend.name, child).await;
            info!("Backend '{}' stopped for restart", backend.name);
        }

        self.ensure_artifact().await.map_err(|e| {
            error!("Backend '{}' build failed: {:#}", backend.name, e);
            ProcessError::Build(format!("{:#}", e))
        })?;

        self.spawn(&backend).await
    }

    /// Forcibly stop a backend. The health flag is cleared right away so the
    /// registry does not wait a probe cycle to reflect the stop.
    pub async fn stop(&self, name: &str) -> Result<(), ProcessError> {
        let backend = self
            .registry
            .get_backend(name)
            .ok_or_else(|| ProcessError::NotFound(name.to_string()))?;

        let mut child = backend
            .detach_process()
            .await
            .ok_or_else(|| ProcessError::NotRunning(name.to_string()))?;

        backend.mark_unhealthy();
        child.kill().await.map_err(ProcessError::Kill)?;
        info!("Backend '{}' stopped", backend.name);
        Ok(())
    }

    /// Kill every backend with an attached process; invoked from the
    /// termination-signal handler.
    pub async fn shutdown_all(&self) {
        info!("Stopping all backend processes ...");
        for backend in self.registry.all_backends() {
            if let Some(child) = backend.detach_process().await {
                backend.mark_unhealthy();
                kill_child(&backend.name, child).await;
                info!("Backend '{}' stopped", backend.name);
            }
        }
        info!("All backends stopped");
    }

    /// Build the backend binary when it does not exist yet. A failure leaves
    /// the backend without a process; the operator retries via the control
    /// surface.
    async fn ensure_artifact(&self) -> Result<()> {
        if self.program.binary.exists() {
            return Ok(());
        }

        if self.program.build_command.is_empty() {
            bail!(
                "backend binary {} does not exist and no build command is configured",
                self.program.binary.display()
            );
        }

        info!(
            "Building backend binary {} ...",
            self.program.binary.display()
        );
        let mut command = Command::new(&self.program.build_command[0]);
        command.args(&self.program.build_command[1..]);
        if let Some(dir) = &self.program.build_dir {
            command.current_dir(dir);
        }

        let status = command
            .status()
            .await
            .context("failed to run build command")?;
        if !status.success() {
            bail!("build command exited with {}", status);
        }
        Ok(())
    }

    async fn spawn(&self, backend: &Arc<Backend>) -> Result<(), ProcessError> {
        let mut child = Command::new(&self.program.binary)
            .args(&self.program.args)
            .env("PORT", backend.port().to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("Backend '{}' couldn't start: {}", backend.name, e);
                ProcessError::Spawn(e)
            })?;

        forward_output(backend.name.clone(), &mut child);
        backend.attach_process(child).await;
        info!(
            "Backend '{}' started (port {})",
            backend.name,
            backend.port()
        );
        Ok(())
    }
}

/// Pipe a child's stdout and stderr into the shared log sink, line by line.
fn forward_output(name: String, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let backend = name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(backend = %backend, "{}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(backend = %name, "{}", line);
            }
        });
    }
}

async fn kill_child(name: &str, mut child: Child) {
    if let Err(e) = child.kill().await {
        warn!("Backend '{}' kill failed: {}", name, e);
    }
}
