//! Domain entity models.

pub mod session;
pub mod tool;
pub mod transaction;
pub mod user;
