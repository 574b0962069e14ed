//! User repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::user::User;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for user records.
#[derive(Clone)]
pub struct UserRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    is_admin: i64,
    credits: i64,
    created_at: String,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(User {
            id: self.id,
            username: self.username,
            is_admin: self.is_admin != 0,
            credits: self.credits,
            created_at,
        })
    }
}

const USER_COLUMNS: &str = "id, username, is_admin, credits, created_at";

impl UserRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new user record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails (including username
    /// uniqueness violations).
    pub async fn create(&self, user: &User) -> Result<User> {
        sqlx::query(
            "INSERT INTO users (id, username, is_admin, credits, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(i64::from(user.is_admin))
        .bind(user.credits)
        .bind(user.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(user.clone())
    }

    /// Retrieve a user by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user does not exist.
    pub async fn get(&self, id: &str) -> Result<User> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map_or_else(
            || Err(AppError::NotFound(format!("user {id} not found"))),
            UserRow::into_user,
        )
    }

    /// Retrieve a user by login name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    /// List all users ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    /// Count all registered users.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }
}
