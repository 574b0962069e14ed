#![forbid(unsafe_code)]

//! `toolbench` — credit-metered development tool session server.
//!
//! Grants users time-boxed access to metered tool instances (notebook
//! servers and the like) paid for from a credit balance. The crate is
//! organised around four components: the [`ledger`] (atomic debit/credit
//! over an append-only transaction log), the [`supervisor`] (spawn,
//! health-check, and stop external tool processes), the session state
//! machine in [`models`] and [`persistence`], and the [`orchestrator`]
//! that coordinates them on launch and end.

pub mod config;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
