//! Session launch: affordability gate, process spawn, session creation.

use tracing::{info, info_span, warn};

use crate::models::session::Session;
use crate::supervisor::ConnectionInfo;
use crate::{AppError, Result};

use super::Orchestrator;

/// Result of a successful launch.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    /// The newly created active session.
    pub session: Session,
    /// Connection details when the tool is backed by a process.
    pub connection: Option<ConnectionInfo>,
}

impl Orchestrator {
    /// Launch a session for `user_id` on `tool_id`.
    ///
    /// The affordability gate requires the balance to cover at least one
    /// hour at the tool's rate. If the tool requires a process and the
    /// spawn fails, no session record is created; if session creation
    /// fails after a successful spawn, the process is stopped again so
    /// nothing is left registered.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user or tool is missing,
    /// `AppError::ToolInactive` if the tool is disabled,
    /// `AppError::InsufficientCredits` if the balance is below one hour's
    /// cost, or `AppError::ProcessStart` if the spawn fails.
    pub async fn launch(&self, user_id: &str, tool_id: &str) -> Result<LaunchOutcome> {
        let span = info_span!("launch", user_id, tool_id);
        let _guard = span.enter();

        let user = self.users().get(user_id).await?;
        let tool = self.tools().get(tool_id).await?;

        if !tool.is_active {
            return Err(AppError::ToolInactive(format!(
                "tool {} is disabled",
                tool.name
            )));
        }

        if user.credits < tool.credits_per_hour {
            return Err(AppError::InsufficientCredits(format!(
                "balance {} is below one hour of {} ({} credits)",
                user.credits, tool.name, tool.credits_per_hour
            )));
        }

        let connection = if tool.requires_process {
            Some(self.supervisor().spawn(&user.id).await?)
        } else {
            None
        };

        let handle = connection.as_ref().map(|c| c.handle.clone());
        let session = Session::new(user.id.clone(), tool.id.clone(), handle);

        let created = match self.sessions().create(&session).await {
            Ok(created) => created,
            Err(err) => {
                // Do not leave a process registered without a session row.
                if let Some(conn) = &connection {
                    if let Err(stop_err) = self.supervisor().stop(&conn.handle).await {
                        warn!(%stop_err, handle = conn.handle, "cleanup stop failed");
                    }
                }
                return Err(err);
            }
        };

        info!(
            session_id = created.id,
            tool = tool.name,
            process = created.process_handle.as_deref().unwrap_or("none"),
            "session launched"
        );

        Ok(LaunchOutcome {
            session: created,
            connection,
        })
    }
}
