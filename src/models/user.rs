//! User model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user holding a credit balance.
///
/// `credits` is the cached running balance; the authoritative history is
/// the append-only transaction log. Both are updated atomically by the
/// ledger, never directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct User {
    /// Unique record identifier.
    pub id: String,
    /// Unique login name; immutable after creation.
    pub username: String,
    /// Whether the user may perform administrative operations
    /// (credit grants, force-ending other users' sessions).
    pub is_admin: bool,
    /// Cached credit balance. May go negative through usage billing.
    pub credits: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Construct a new user with a zero balance and generated identifier.
    #[must_use]
    pub fn new(username: String, is_admin: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            is_admin,
            credits: 0,
            created_at: Utc::now(),
        }
    }
}
