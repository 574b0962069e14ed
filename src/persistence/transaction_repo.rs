//! Credit transaction repository for `SQLite` persistence.
//!
//! Read-side only: transactions are appended by the ledger inside the
//! same database transaction that updates the cached balance, never
//! through this repository.

use std::sync::Arc;

use chrono::Utc;

use crate::models::transaction::CreditTransaction;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for credit transaction records.
#[derive(Clone)]
pub struct TransactionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: String,
    user_id: String,
    amount: i64,
    description: String,
    performed_by: String,
    created_at: String,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<CreditTransaction> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(CreditTransaction {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            description: self.description,
            performed_by: self.performed_by,
            created_at,
        })
    }
}

impl TransactionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// List a user's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<CreditTransaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            "SELECT id, user_id, amount, description, performed_by, created_at
             FROM credit_transactions
             WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(TransactionRow::into_transaction)
            .collect()
    }

    /// Fold of a user's transaction amounts.
    ///
    /// The ledger invariant is that this always equals the cached
    /// `users.credits` column for the same user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn balance_of(&self, user_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0) FROM credit_transactions WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(row.0)
    }
}
