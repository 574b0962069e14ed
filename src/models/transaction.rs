//! Credit transaction model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable record of a credit balance delta.
///
/// Negative amounts are usage debits, positive amounts are grants. A
/// user's balance is the fold of their transaction amounts; the cached
/// `User::credits` column must agree with it at all times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CreditTransaction {
    /// Unique record identifier.
    pub id: String,
    /// User whose balance the delta applies to.
    pub user_id: String,
    /// Signed balance delta; never zero.
    pub amount: i64,
    /// Free-text reason for the delta.
    pub description: String,
    /// Who authorized it: the user themself for usage debits, an admin
    /// for grants.
    pub performed_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Construct a new transaction with a generated identifier.
    #[must_use]
    pub fn new(user_id: String, amount: i64, description: String, performed_by: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            amount,
            description,
            performed_by,
            created_at: Utc::now(),
        }
    }
}
