//! Persistence layer modules.
//!
//! One repository struct per entity over a shared `SQLite` pool. The
//! repositories are the narrow storage interface the lifecycle core is
//! written against; tests run them on an in-memory database.

pub mod db;
pub mod schema;
pub mod session_repo;
pub mod tool_repo;
pub mod transaction_repo;
pub mod user_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
