//! Tool catalog repository for `SQLite` persistence.

use std::sync::Arc;

use crate::models::tool::Tool;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for tool catalog records.
#[derive(Clone)]
pub struct ToolRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ToolRow {
    id: String,
    name: String,
    description: String,
    credits_per_hour: i64,
    is_active: i64,
    requires_process: i64,
}

impl ToolRow {
    fn into_tool(self) -> Tool {
        Tool {
            id: self.id,
            name: self.name,
            description: self.description,
            credits_per_hour: self.credits_per_hour,
            is_active: self.is_active != 0,
            requires_process: self.requires_process != 0,
        }
    }
}

const TOOL_COLUMNS: &str = "id, name, description, credits_per_hour, is_active, requires_process";

impl ToolRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new tool record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails, including the
    /// `credits_per_hour > 0` CHECK constraint.
    pub async fn create(&self, tool: &Tool) -> Result<Tool> {
        sqlx::query(
            "INSERT INTO tools (id, name, description, credits_per_hour, is_active, requires_process)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&tool.id)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(tool.credits_per_hour)
        .bind(i64::from(tool.is_active))
        .bind(i64::from(tool.requires_process))
        .execute(self.db.as_ref())
        .await?;

        Ok(tool.clone())
    }

    /// Retrieve a tool by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the tool does not exist.
    pub async fn get(&self, id: &str) -> Result<Tool> {
        let row: Option<ToolRow> =
            sqlx::query_as(&format!("SELECT {TOOL_COLUMNS} FROM tools WHERE id = ?1"))
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(ToolRow::into_tool)
            .ok_or_else(|| AppError::NotFound(format!("tool {id} not found")))
    }

    /// List the full tool catalog ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<Tool>> {
        let rows: Vec<ToolRow> =
            sqlx::query_as(&format!("SELECT {TOOL_COLUMNS} FROM tools ORDER BY name ASC"))
                .fetch_all(self.db.as_ref())
                .await?;

        Ok(rows.into_iter().map(ToolRow::into_tool).collect())
    }

    /// Enable or disable a tool for new launches.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the tool does not exist.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<Tool> {
        let result = sqlx::query("UPDATE tools SET is_active = ?1 WHERE id = ?2")
            .bind(i64::from(active))
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("tool {id} not found")));
        }
        self.get(id).await
    }

    /// Seed the default tool catalog when the table is empty.
    ///
    /// Matches the catalog the original deployment shipped with; only
    /// Jupyter is backed by a supervised process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a query fails.
    pub async fn seed_defaults(&self) -> Result<()> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tools")
            .fetch_one(self.db.as_ref())
            .await?;
        if row.0 > 0 {
            return Ok(());
        }

        let defaults = [
            Tool::new(
                "VS Code".into(),
                "Code editor for all languages".into(),
                10,
                false,
            ),
            Tool::new("RStudio".into(), "IDE for R programming".into(), 12, false),
            Tool::new(
                "Jupyter".into(),
                "Notebook for data science".into(),
                8,
                true,
            ),
            Tool::new("Orange".into(), "Visual data mining tool".into(), 15, false),
        ];

        for tool in &defaults {
            self.create(tool).await?;
        }
        Ok(())
    }
}
