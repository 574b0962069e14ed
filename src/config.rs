//! Global configuration parsing and validation.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Settings for the supervised tool process.
///
/// The supervisor is tool-agnostic: it runs `command` with `args` inside a
/// per-user isolation directory and hands over the access token and port
/// through `TOOLBENCH_*` environment variables. The default command starts
/// a Jupyter notebook server, matching the seeded tool catalog.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessConfig {
    /// Executable to launch for process-backed tools.
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// TCP port the tool instance is expected to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL advertised to callers for connecting to an instance.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Seconds to wait for a stopping process before force-killing it.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,
}

fn default_command() -> String {
    "jupyter".into()
}

fn default_args() -> Vec<String> {
    vec!["notebook".into(), "--no-browser".into()]
}

fn default_port() -> u16 {
    8888
}

fn default_base_url() -> String {
    "http://127.0.0.1".into()
}

fn default_stop_grace() -> u64 {
    5
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            port: default_port(),
            base_url: default_base_url(),
            stop_grace_seconds: default_stop_grace(),
        }
    }
}

fn default_reconcile_interval() -> u64 {
    5
}

fn default_db_file() -> PathBuf {
    PathBuf::from("toolbench.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root directory under which per-user isolation directories are
    /// provisioned.
    pub workspace_root: PathBuf,
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_file")]
    pub db_path: PathBuf,
    /// Interval between reconciliation sweeps over active sessions and
    /// supervised processes.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,
    /// Supervised process settings.
    #[serde(default)]
    pub process: ProcessConfig,
}

impl GlobalConfig {
    /// Parse a configuration from a TOML document and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the document is malformed or a field
    /// fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field-level invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.workspace_root.as_os_str().is_empty() {
            return Err(AppError::Config("workspace_root must not be empty".into()));
        }
        if self.process.command.is_empty() {
            return Err(AppError::Config("process.command must not be empty".into()));
        }
        if self.reconcile_interval_seconds == 0 {
            return Err(AppError::Config(
                "reconcile_interval_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Path to the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
