//! Session orchestrator — coordinates ledger, supervisor, and session
//! state on launch and end.

mod launcher;
mod reconciler;
mod session_manager;

pub use launcher::LaunchOutcome;
pub use reconciler::spawn_reconciler;
pub use session_manager::usage_cost;

use std::sync::Arc;

use tracing::{info, info_span};

use crate::ledger::CreditLedger;
use crate::persistence::db::Database;
use crate::persistence::session_repo::SessionRepo;
use crate::persistence::tool_repo::ToolRepo;
use crate::persistence::transaction_repo::TransactionRepo;
use crate::persistence::user_repo::UserRepo;
use crate::supervisor::{ProcessStatus, ProcessSupervisor};
use crate::{AppError, Result};

/// Aggregate usage counters for administrative reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageStats {
    /// Number of registered users.
    pub total_users: u64,
    /// Number of currently active sessions.
    pub active_sessions: u64,
    /// Sum of credits billed across all ended sessions.
    pub total_credits_used: i64,
}

/// Coordinates the credit ledger, process supervisor, and session state
/// machine. All state is injected at construction so tests can stand up
/// independent instances.
#[derive(Clone)]
pub struct Orchestrator {
    users: UserRepo,
    tools: ToolRepo,
    sessions: SessionRepo,
    transactions: TransactionRepo,
    ledger: CreditLedger,
    supervisor: Arc<ProcessSupervisor>,
}

impl Orchestrator {
    /// Build an orchestrator over the shared database pool and supervisor.
    #[must_use]
    pub fn new(db: Arc<Database>, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            users: UserRepo::new(Arc::clone(&db)),
            tools: ToolRepo::new(Arc::clone(&db)),
            sessions: SessionRepo::new(Arc::clone(&db)),
            transactions: TransactionRepo::new(Arc::clone(&db)),
            ledger: CreditLedger::new(db),
            supervisor,
        }
    }

    /// User repository.
    #[must_use]
    pub fn users(&self) -> &UserRepo {
        &self.users
    }

    /// Tool catalog repository.
    #[must_use]
    pub fn tools(&self) -> &ToolRepo {
        &self.tools
    }

    /// Session repository.
    #[must_use]
    pub fn sessions(&self) -> &SessionRepo {
        &self.sessions
    }

    /// Credit transaction repository.
    #[must_use]
    pub fn transactions(&self) -> &TransactionRepo {
        &self.transactions
    }

    /// Credit ledger.
    #[must_use]
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Process supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Administrative credit grant.
    ///
    /// Never fails on "too many credits".
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if `admin_id` is not an
    /// administrator, `AppError::NotFound` if either user is missing, or
    /// `AppError::Ledger` for a non-positive amount.
    pub async fn grant(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        admin_id: &str,
    ) -> Result<i64> {
        let span = info_span!("grant", user_id, amount, admin_id);
        let _guard = span.enter();

        let admin = self.users.get(admin_id).await?;
        if !admin.is_admin {
            return Err(AppError::Unauthorized(
                "credit grants require an administrator".into(),
            ));
        }

        // Surface NotFound for the target before touching the ledger.
        self.users.get(user_id).await?;

        let balance = self.ledger.credit(user_id, amount, reason, admin_id).await?;
        info!(user_id, amount, balance, "credits granted");
        Ok(balance)
    }

    /// Last-known liveness of a supervised process handle.
    ///
    /// Polled by callers to detect readiness before exposing a connection
    /// URL; apply bounded retry/backoff on the calling side.
    pub async fn process_status(&self, handle: &str) -> ProcessStatus {
        self.supervisor.status(handle).await
    }

    /// Aggregate usage counters for administrative reporting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a query fails.
    pub async fn stats(&self) -> Result<UsageStats> {
        Ok(UsageStats {
            total_users: self.users.count().await?,
            active_sessions: self.sessions.count_active().await?,
            total_credits_used: self.sessions.total_credits_used().await?,
        })
    }
}
