//! Credit ledger: atomic debit/credit over an append-only transaction log.
//!
//! Every mutation appends exactly one [`CreditTransaction`] and updates the
//! cached `users.credits` balance inside a single database transaction.
//! Mutations for the same user serialize on a per-user mutex so that two
//! concurrent debits can never both read the pre-debit balance; different
//! users never contend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info_span};
use uuid::Uuid;

use crate::persistence::db::Database;
use crate::{AppError, Result};

/// Map of per-user serialization locks, allocated on first use.
type UserLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Atomic credit/debit operations for user balances.
#[derive(Clone)]
pub struct CreditLedger {
    db: Arc<Database>,
    locks: UserLocks,
}

impl CreditLedger {
    /// Create a ledger over the shared database pool.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append a positive transaction and return the new balance.
    ///
    /// Never fails on "too many credits".
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` for a non-positive amount,
    /// `AppError::NotFound` if the user does not exist, or `AppError::Db`
    /// on persistence failure.
    pub async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        description: &str,
        performed_by: &str,
    ) -> Result<i64> {
        let span = info_span!("ledger_credit", user_id, amount);
        let _guard = span.enter();

        ensure_positive(amount)?;
        self.apply(user_id, amount, description, performed_by, true)
            .await
    }

    /// Append a negative transaction, rejecting overdrafts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InsufficientCredits` if the debit would drive
    /// the balance below zero, `AppError::Ledger` for a non-positive
    /// amount, or `AppError::NotFound` if the user does not exist.
    pub async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        description: &str,
        performed_by: &str,
    ) -> Result<i64> {
        let span = info_span!("ledger_debit", user_id, amount);
        let _guard = span.enter();

        ensure_positive(amount)?;
        self.apply(user_id, -amount, description, performed_by, false)
            .await
    }

    /// Append a negative transaction for usage already consumed.
    ///
    /// Unlike [`CreditLedger::debit`], the balance is permitted to go
    /// negative: the cost reflects elapsed time that cannot be un-spent.
    /// Only the pre-flight affordability check at launch gates on balance.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` for a non-positive amount, or
    /// `AppError::NotFound` if the user does not exist.
    pub async fn charge_usage(
        &self,
        user_id: &str,
        amount: i64,
        description: &str,
        performed_by: &str,
    ) -> Result<i64> {
        let span = info_span!("ledger_charge_usage", user_id, amount);
        let _guard = span.enter();

        ensure_positive(amount)?;
        self.apply(user_id, -amount, description, performed_by, true)
            .await
    }

    /// Read a user's cached balance.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user does not exist.
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT credits FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(|(credits,)| credits)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))
    }

    /// Read-modify-write of the cached balance plus the transaction
    /// append, under the per-user lock and one database transaction.
    async fn apply(
        &self,
        user_id: &str,
        delta: i64,
        description: &str,
        performed_by: &str,
        allow_negative: bool,
    ) -> Result<i64> {
        let lock = self.user_lock(user_id).await;
        let _serialized = lock.lock().await;

        let mut tx = self.db.begin().await?;

        let row: Option<(i64,)> = sqlx::query_as("SELECT credits FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let balance = row
            .map(|(credits,)| credits)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;

        let new_balance = balance + delta;
        if new_balance < 0 && !allow_negative {
            return Err(AppError::InsufficientCredits(format!(
                "balance {balance} does not cover debit of {}",
                -delta
            )));
        }

        sqlx::query("UPDATE users SET credits = ?1 WHERE id = ?2")
            .bind(new_balance)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO credit_transactions
                (id, user_id, amount, description, performed_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(delta)
        .bind(description)
        .bind(performed_by)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(user_id, delta, new_balance, "ledger entry applied");
        Ok(new_balance)
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(user_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

fn ensure_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(AppError::Ledger(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
