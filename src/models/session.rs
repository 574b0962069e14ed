//! Session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for a tool session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session running; the only non-terminal state.
    Active,
    /// Session ended normally by its owner, cost computed and billed.
    Completed,
    /// Session ended by an administrator, a crash, or the
    /// reconciliation sweep.
    Terminated,
}

impl SessionStatus {
    /// Whether this status admits no further transition.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }
}

/// A (user, tool) session with elapsed-time billing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique record identifier.
    pub id: String,
    /// Owning user; immutable after creation.
    pub user_id: String,
    /// Tool the session runs; immutable after creation.
    pub tool_id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Creation timestamp; immutable.
    pub start_time: DateTime<Utc>,
    /// Set exactly once, at the transition to a terminal status.
    pub end_time: Option<DateTime<Utc>>,
    /// Zero while active; computed exactly once at termination.
    pub credits_used: i64,
    /// Supervisor handle of the backing process, if the tool requires one.
    pub process_handle: Option<String>,
}

impl Session {
    /// Construct a new active session with a generated identifier.
    #[must_use]
    pub fn new(user_id: String, tool_id: String, process_handle: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            tool_id,
            status: SessionStatus::Active,
            start_time: Utc::now(),
            end_time: None,
            credits_used: 0,
            process_handle,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Only `active -> completed` and `active -> terminated` exist; a
    /// terminal session admits no transition at all.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        self.status == SessionStatus::Active && next.is_terminal()
    }
}
