//! Session repository for `SQLite` persistence.
//!
//! Holds the atomic terminal-transition claim ([`SessionRepo::claim_terminal`])
//! that makes concurrent `end` calls settle on exactly one winner.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::session::{Session, SessionStatus};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    tool_id: String,
    status: String,
    start_time: String,
    end_time: Option<String>,
    credits_used: i64,
    process_handle: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<Session> {
        let status = parse_status(&self.status)?;
        let start_time = parse_timestamp(&self.start_time, "start_time")?;
        let end_time = self
            .end_time
            .as_deref()
            .map(|t| parse_timestamp(t, "end_time"))
            .transpose()?;

        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            tool_id: self.tool_id,
            status,
            start_time,
            end_time,
            credits_used: self.credits_used,
            process_handle: self.process_handle,
        })
    }
}

fn parse_timestamp(text: &str, field: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

fn parse_status(s: &str) -> Result<SessionStatus> {
    match s {
        "active" => Ok(SessionStatus::Active),
        "completed" => Ok(SessionStatus::Completed),
        "terminated" => Ok(SessionStatus::Terminated),
        other => Err(AppError::Db(format!("invalid session status: {other}"))),
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
        SessionStatus::Terminated => "terminated",
    }
}

const SESSION_COLUMNS: &str =
    "id, user_id, tool_id, status, start_time, end_time, credits_used, process_handle";

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, session: &Session) -> Result<Session> {
        sqlx::query(
            "INSERT INTO sessions
                (id, user_id, tool_id, status, start_time, end_time, credits_used, process_handle)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.tool_id)
        .bind(status_str(session.status))
        .bind(session.start_time.to_rfc3339())
        .bind(session.end_time.map(|t| t.to_rfc3339()))
        .bind(session.credits_used)
        .bind(&session.process_handle)
        .execute(self.db.as_ref())
        .await?;

        Ok(session.clone())
    }

    /// Retrieve a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn get(&self, id: &str) -> Result<Session> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map_or_else(
            || Err(AppError::NotFound(format!("session {id} not found"))),
            SessionRow::into_session,
        )
    }

    /// Atomically claim the active → terminal transition.
    ///
    /// Issues a compare-and-set on the status column; of any number of
    /// concurrent callers, exactly one observes `true` and owns the
    /// billing side effect. `end_time` is written by the same statement
    /// so it is set exactly once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if `status` is not terminal or the update
    /// fails.
    pub async fn claim_terminal(
        &self,
        id: &str,
        status: SessionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(AppError::Db(format!(
                "claim requires a terminal status, got {}",
                status_str(status)
            )));
        }

        let result = sqlx::query(
            "UPDATE sessions SET status = ?1, end_time = ?2
             WHERE id = ?3 AND status = 'active'",
        )
        .bind(status_str(status))
        .bind(end_time.to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the billed cost on a claimed session.
    ///
    /// Write-once by construction: only the claim winner calls this, and
    /// only immediately after winning the claim.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn set_credits_used(&self, id: &str, credits_used: i64) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET credits_used = ?1 WHERE id = ?2")
            .bind(credits_used)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("session {id} not found")));
        }
        Ok(())
    }

    /// List all active sessions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Session>> {
        self.list_where("status = 'active'", None).await
    }

    /// List active sessions that have a bound process handle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_active_with_process(&self) -> Result<Vec<Session>> {
        self.list_where("status = 'active' AND process_handle IS NOT NULL", None)
            .await
    }

    /// List a user's active sessions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        self.list_where("status = 'active' AND user_id = ?1", Some(user_id))
            .await
    }

    /// List a user's full session history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE user_id = ?1 ORDER BY start_time DESC"
        ))
        .bind(user_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    /// Find the active session bound to a process handle, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_active_by_handle(&self, handle: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE status = 'active' AND process_handle = ?1"
        ))
        .bind(handle)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Count active sessions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_active(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE status = 'active'")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }

    /// Sum of `credits_used` over all ended sessions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn total_credits_used(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(credits_used), 0) FROM sessions WHERE status != 'active'",
        )
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(row.0)
    }

    async fn list_where(&self, predicate: &str, bind: Option<&str>) -> Result<Vec<Session>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE {predicate} ORDER BY start_time ASC"
        );
        let mut q = sqlx::query_as(&query);
        if let Some(value) = bind {
            q = q.bind(value);
        }
        let rows: Vec<SessionRow> = q.fetch_all(self.db.as_ref()).await?;
        rows.into_iter().map(SessionRow::into_session).collect()
    }
}
