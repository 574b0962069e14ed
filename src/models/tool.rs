//! Development tool model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A metered development tool users can launch sessions against.
///
/// Immutable after creation except for the `is_active` flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Tool {
    /// Unique record identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short human-readable description.
    pub description: String,
    /// Credits billed per hour of use; always positive.
    pub credits_per_hour: i64,
    /// Whether the tool may currently be launched.
    pub is_active: bool,
    /// Whether launching the tool spawns a supervised external process.
    pub requires_process: bool,
}

impl Tool {
    /// Construct a new active tool with a generated identifier.
    #[must_use]
    pub fn new(
        name: String,
        description: String,
        credits_per_hour: i64,
        requires_process: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            credits_per_hour,
            is_active: true,
            requires_process,
        }
    }
}
