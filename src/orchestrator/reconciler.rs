//! Reconciliation — closes sessions whose process died without an
//! explicit end call.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::supervisor::ProcessStatus;
use crate::Result;

use super::Orchestrator;

/// Spawn the background reconciliation task.
///
/// Polls at `interval` until the `CancellationToken` fires. Each sweep
/// force-ends active sessions whose supervised process is gone; this is
/// the only path by which a session ends without an explicit caller.
#[must_use]
pub fn spawn_reconciler(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("reconciler shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            if let Err(err) = orchestrator.reconcile_once().await {
                warn!(%err, "reconciliation sweep failed");
            }
        }
    })
}

impl Orchestrator {
    /// Run one reconciliation sweep.
    ///
    /// Collects processes that exited on their own, then checks every
    /// active process-backed session against the registry; any session
    /// whose handle is no longer running is force-ended with reason
    /// "process died".
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a session query fails. Individual
    /// force-end failures are logged and do not abort the sweep.
    pub async fn reconcile_once(&self) -> Result<()> {
        for handle in self.supervisor().collect_exited().await {
            match self.sessions().find_active_by_handle(&handle).await? {
                Some(session) => {
                    if let Err(err) = self.force_end(&session.id, "process died").await {
                        warn!(%err, session_id = session.id, "failed to end dead-process session");
                    }
                }
                None => {
                    debug!(handle, "exited process had no active session");
                }
            }
        }

        // Catch sessions whose entry was already dropped from the
        // registry (e.g. via a status() poll that observed the exit).
        for session in self.sessions().list_active_with_process().await? {
            let Some(handle) = session.process_handle.as_deref() else {
                continue;
            };
            if self.supervisor().status(handle).await == ProcessStatus::Running {
                continue;
            }
            if let Err(err) = self.force_end(&session.id, "process died").await {
                warn!(%err, session_id = session.id, "failed to end dead-process session");
            }
        }

        Ok(())
    }

    /// Close sessions orphaned by a restart.
    ///
    /// Process entries are not persisted, so any session still active
    /// with a bound handle at startup references a process that cannot
    /// be recovered. Each is force-ended, billing elapsed time up to now.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the session query fails.
    pub async fn reconcile_startup(&self) -> Result<()> {
        let orphaned = self.sessions().list_active_with_process().await?;
        for session in orphaned {
            info!(session_id = session.id, "closing session orphaned by restart");
            if let Err(err) = self.force_end(&session.id, "orphaned on restart").await {
                warn!(%err, session_id = session.id, "failed to end orphaned session");
            }
        }
        Ok(())
    }
}
