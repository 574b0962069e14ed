//! Session end: terminal-transition claim, process stop, billing.

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use crate::models::session::{Session, SessionStatus};
use crate::{AppError, Result};

use super::Orchestrator;

/// Whole-credit cost of a session, rounded up.
///
/// Partial-hour usage bills as a full increment: ceiling, not rounding,
/// with a floor of zero and no cap.
#[must_use]
pub fn usage_cost(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    credits_per_hour: i64,
) -> i64 {
    let seconds = (end - start).num_seconds().max(0);
    let total = seconds * credits_per_hour;
    let quotient = total / 3600;
    if total % 3600 > 0 {
        quotient + 1
    } else {
        quotient
    }
}

impl Orchestrator {
    /// End a session on behalf of `caller_id`.
    ///
    /// Only the session's owner or an administrator may end it. An owner
    /// ending their own session completes it; an administrator ending
    /// someone else's terminates it. Ending an already-ended session is a
    /// no-op success returning the terminal session unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is missing, or
    /// `AppError::Unauthorized` if the caller is neither the owner nor an
    /// administrator.
    pub async fn end(&self, session_id: &str, caller_id: &str) -> Result<Session> {
        let span = info_span!("end_session", session_id, caller_id);
        let _guard = span.enter();

        let session = self.sessions().get(session_id).await?;

        let caller = match self.users().get(caller_id).await {
            Ok(caller) => caller,
            Err(AppError::NotFound(_)) => {
                return Err(AppError::Unauthorized(format!(
                    "unknown caller {caller_id}"
                )))
            }
            Err(err) => return Err(err),
        };

        let is_owner = caller.id == session.user_id;
        if !is_owner && !caller.is_admin {
            return Err(AppError::Unauthorized(
                "session belongs to a different user".into(),
            ));
        }

        let status = if is_owner {
            SessionStatus::Completed
        } else {
            SessionStatus::Terminated
        };
        self.finish(session, status, "ended by caller").await
    }

    /// Force a session into `terminated` without caller authorization.
    ///
    /// Used by the reconciliation sweep and administrative tooling; runs
    /// the same claim/stop/bill path as a normal end.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is missing.
    pub async fn force_end(&self, session_id: &str, reason: &str) -> Result<Session> {
        let span = info_span!("force_end", session_id, reason);
        let _guard = span.enter();

        let session = self.sessions().get(session_id).await?;
        self.finish(session, SessionStatus::Terminated, reason).await
    }

    /// Claim the terminal transition and perform the billing side effect.
    ///
    /// Exactly one concurrent caller wins the claim; losers observe the
    /// already-terminal session and bill nothing. A process-stop failure
    /// is logged and never blocks billing — a hung process must not trap
    /// the user's credits.
    async fn finish(
        &self,
        session: Session,
        status: SessionStatus,
        reason: &str,
    ) -> Result<Session> {
        let end_time = Utc::now();
        let claimed = self
            .sessions()
            .claim_terminal(&session.id, status, end_time)
            .await?;
        if !claimed {
            debug!(session_id = session.id, "session already ended");
            return self.sessions().get(&session.id).await;
        }

        if let Some(handle) = &session.process_handle {
            if let Err(err) = self.supervisor().stop(handle).await {
                warn!(%err, handle, "process stop failed, billing proceeds");
            }
        }

        let tool = self.tools().get(&session.tool_id).await?;
        let cost = usage_cost(session.start_time, end_time, tool.credits_per_hour);

        if cost > 0 {
            // Usage already consumed: this debit may drive the balance
            // negative, unlike the affordability gate at launch.
            self.ledger()
                .charge_usage(
                    &session.user_id,
                    cost,
                    &format!("Used {cost} credits for {} session", tool.name),
                    &session.user_id,
                )
                .await?;
        }
        self.sessions().set_credits_used(&session.id, cost).await?;

        info!(
            session_id = session.id,
            cost,
            reason,
            status = ?status,
            "session ended"
        );
        self.sessions().get(&session.id).await
    }
}
