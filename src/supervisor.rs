//! Process supervisor — spawn, health-check, and stop tool instances.
//!
//! Each spawned instance runs in a per-user isolation directory with a
//! random access token, tracked in an in-memory registry keyed by an
//! opaque handle. The registry is never persisted; sessions bound to
//! handles that do not survive a restart are closed by the startup
//! reconciliation pass.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::ProcessConfig;
use crate::{AppError, Result};

/// Last-known liveness of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Process is alive as of the most recent check.
    Running,
    /// Process was tracked but has exited.
    Stopped,
    /// Handle is unknown to the registry.
    NotFound,
}

/// Connection details returned to the caller on spawn.
///
/// The caller should poll [`ProcessSupervisor::status`] with its own
/// retry/backoff before exposing the URL; spawn returns as soon as the
/// process is launched, not once it is confirmed ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Opaque handle for later `status`/`stop` calls.
    pub handle: String,
    /// URL the instance will serve on once ready.
    pub url: String,
    /// Random access token the instance was launched with.
    pub token: String,
}

/// A tracked external process.
struct ProcessEntry {
    token: String,
    url: String,
    child: Child,
}

/// Registry of live tool processes keyed by opaque handle.
type Registry = Arc<Mutex<HashMap<String, ProcessEntry>>>;

/// Supervisor owning the spawn/stop lifecycle of tool processes.
#[derive(Clone)]
pub struct ProcessSupervisor {
    config: ProcessConfig,
    workspace_root: PathBuf,
    registry: Registry,
}

impl ProcessSupervisor {
    /// Create a supervisor provisioning isolation directories under
    /// `workspace_root`.
    #[must_use]
    pub fn new(config: ProcessConfig, workspace_root: PathBuf) -> Self {
        Self {
            config,
            workspace_root,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a tool instance for `owner_key`.
    ///
    /// Allocates a random handle and access token, creates the isolation
    /// directory idempotently, and launches the configured command inside
    /// it with the token, port, and working directory handed over in
    /// `TOOLBENCH_*` environment variables. The child is registered with
    /// `kill_on_drop` as a backstop.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the isolation directory cannot be
    /// created, or `AppError::ProcessStart` if the process fails to
    /// launch.
    pub async fn spawn(&self, owner_key: &str) -> Result<ConnectionInfo> {
        let span = info_span!("spawn_process", owner = owner_key);
        let _guard = span.enter();

        let handle = Uuid::new_v4().simple().to_string();
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        let isolation_dir = self.workspace_root.join(owner_key);
        tokio::fs::create_dir_all(&isolation_dir)
            .await
            .map_err(|err| AppError::Io(format!("failed to create isolation dir: {err}")))?;

        let url = format!("{}:{}", self.config.base_url, self.config.port);

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .env("TOOLBENCH_ACCESS_TOKEN", &token)
            .env("TOOLBENCH_PORT", self.config.port.to_string())
            .env("TOOLBENCH_WORKDIR", &isolation_dir)
            .current_dir(&isolation_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|err| {
            AppError::ProcessStart(format!(
                "failed to spawn {}: {err}",
                self.config.command
            ))
        })?;

        info!(
            handle,
            pid = child.id().unwrap_or(0),
            command = self.config.command,
            "tool process spawned"
        );

        let entry = ProcessEntry {
            token: token.clone(),
            url: url.clone(),
            child,
        };
        self.registry.lock().await.insert(handle.clone(), entry);

        Ok(ConnectionInfo { handle, url, token })
    }

    /// Stop a tool process. Idempotent: an unknown or already-stopped
    /// handle is a success, since the process is gone either way.
    ///
    /// A live child gets `stop_grace_seconds` to exit after the kill
    /// signal before a forced kill. The registry entry is removed exactly
    /// once regardless of outcome.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessStop` if the kill signal cannot be
    /// delivered to a live process.
    pub async fn stop(&self, handle: &str) -> Result<()> {
        let span = info_span!("stop_process", handle);
        let _guard = span.enter();

        let Some(mut entry) = self.registry.lock().await.remove(handle) else {
            debug!(handle, "stop on unknown handle, nothing to do");
            return Ok(());
        };

        if let Err(err) = entry.child.start_kill() {
            // A kill-delivery failure on an already-exited child is fine.
            if let Ok(Some(exit)) = entry.child.try_wait() {
                info!(handle, ?exit, "process had already exited");
                return Ok(());
            }
            return Err(AppError::ProcessStop(format!(
                "failed to signal process: {err}"
            )));
        }

        let grace = Duration::from_secs(self.config.stop_grace_seconds);
        match tokio::time::timeout(grace, entry.child.wait()).await {
            Ok(Ok(exit)) => {
                info!(handle, ?exit, "tool process stopped");
                Ok(())
            }
            Ok(Err(err)) => Err(AppError::ProcessStop(format!(
                "error waiting for process exit: {err}"
            ))),
            Err(_) => {
                warn!(handle, "process did not exit within grace period, forcing kill");
                entry
                    .child
                    .kill()
                    .await
                    .map_err(|err| AppError::ProcessStop(format!("force-kill failed: {err}")))
            }
        }
    }

    /// Last-known liveness for a handle.
    ///
    /// A process observed exited is removed from the registry on the spot
    /// so dead entries do not accumulate.
    pub async fn status(&self, handle: &str) -> ProcessStatus {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.get_mut(handle) else {
            return ProcessStatus::NotFound;
        };

        match entry.child.try_wait() {
            Ok(None) => ProcessStatus::Running,
            Ok(Some(exit)) => {
                info!(handle, ?exit, "tool process exited");
                registry.remove(handle);
                ProcessStatus::Stopped
            }
            Err(err) => {
                warn!(handle, %err, "failed to poll tool process, dropping entry");
                registry.remove(handle);
                ProcessStatus::Stopped
            }
        }
    }

    /// Connection details for a tracked handle, if still registered.
    pub async fn connection(&self, handle: &str) -> Option<ConnectionInfo> {
        let registry = self.registry.lock().await;
        registry.get(handle).map(|entry| ConnectionInfo {
            handle: handle.to_owned(),
            url: entry.url.clone(),
            token: entry.token.clone(),
        })
    }

    /// Scan the registry for processes that exited on their own, remove
    /// them, and return their handles for session reconciliation.
    pub async fn collect_exited(&self) -> Vec<String> {
        let mut registry = self.registry.lock().await;
        let mut exited = Vec::new();

        for (handle, entry) in registry.iter_mut() {
            match entry.child.try_wait() {
                Ok(Some(exit)) => {
                    info!(handle, ?exit, "tool process exited independently");
                    exited.push(handle.clone());
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(handle, %err, "failed to poll tool process, dropping entry");
                    exited.push(handle.clone());
                }
            }
        }

        for handle in &exited {
            registry.remove(handle);
        }
        exited
    }

    /// Number of tracked processes. Exposed for leak checks in tests.
    pub async fn tracked_count(&self) -> usize {
        self.registry.lock().await.len()
    }
}
