#![forbid(unsafe_code)]

//! `toolbench` — credit-metered tool session server binary.
//!
//! Bootstraps configuration and storage, runs the startup reconciliation
//! pass, and keeps the reconciliation sweep running until shutdown. The
//! HTTP/API layer is an external collaborator and not part of this
//! binary; it drives the orchestrator in-process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use toolbench::config::GlobalConfig;
use toolbench::orchestrator::{spawn_reconciler, Orchestrator};
use toolbench::persistence::db;
use toolbench::persistence::tool_repo::ToolRepo;
use toolbench::supervisor::ProcessSupervisor;
use toolbench::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "toolbench", about = "Credit-metered tool session server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the workspace root for isolation directories.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("toolbench server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config_text = std::fs::read_to_string(&args.config)
        .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
    let mut config = GlobalConfig::from_toml_str(&config_text)?;

    if let Some(ws) = args.workspace {
        config.workspace_root = ws;
    }
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let database = Arc::new(db::connect(config.db_path()).await?);
    ToolRepo::new(Arc::clone(&database)).seed_defaults().await?;
    info!("database connected");

    // ── Build core components ───────────────────────────
    let supervisor = Arc::new(ProcessSupervisor::new(
        config.process.clone(),
        config.workspace_root.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(database, Arc::clone(&supervisor)));

    // Process entries do not survive restarts; close whatever was left
    // active before accepting new work.
    orchestrator.reconcile_startup().await?;

    // ── Start reconciliation sweep ──────────────────────
    let cancel = CancellationToken::new();
    let reconciler = spawn_reconciler(
        Arc::clone(&orchestrator),
        Duration::from_secs(config.reconcile_interval_seconds),
        cancel.clone(),
    );
    info!("reconciler started");

    // ── Run until shutdown ──────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::Io(format!("failed to listen for ctrl-c: {err}")))?;
    info!("shutdown signal received");

    cancel.cancel();
    if let Err(err) = reconciler.await {
        return Err(AppError::Io(format!("reconciler task panicked: {err}")));
    }

    info!("toolbench server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
