#![forbid(unsafe_code)]

//! `transfer-agent`: local transfer execution engine binary.
//!
//! Loads configuration, reads a transfer request from JSON, runs it through
//! the configured agent, streams lifecycle notifications to the log, and
//! reports one outcome per session.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use transfer_agent::agent;
use transfer_agent::config::AgentConfig;
use transfer_agent::models::request::TransferRequest;
use transfer_agent::notify::TransferNotification;
use transfer_agent::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "transfer-agent", about = "Local transfer execution engine", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the transfer request, as JSON.
    #[arg(long)]
    spec: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("transfer-agent bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = match &args.config {
        Some(path) => AgentConfig::load_from_path(path)?,
        None => AgentConfig::default(),
    };
    let config = Arc::new(config);
    info!("configuration loaded");

    let raw = std::fs::read_to_string(&args.spec)
        .map_err(|err| AppError::Config(format!("cannot read transfer spec: {err}")))?;
    let request: TransferRequest = serde_json::from_str(&raw)
        .map_err(|err| AppError::Config(format!("invalid transfer spec: {err}")))?;

    let agent = agent::for_config(Arc::clone(&config));

    // Stream lifecycle notifications into the log.
    let (tx, mut rx) = mpsc::channel::<TransferNotification>(64);
    agent.register_listener(tx).await;
    let progress = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            log_notification(&notification);
        }
    });

    let job_id = agent.start_transfer(request, None).await?;
    info!(%job_id, "transfer submitted");

    let outcomes = agent.wait_for_transfers_completion().await;

    // Dropping the agent releases the listener sender so the progress task
    // drains and exits.
    drop(agent);
    if let Err(err) = progress.await {
        error!(%err, "progress task failed");
    }

    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.error {
            None => info!(
                job_id = %outcome.job_id,
                session_index = outcome.session_index,
                worker_session_id = outcome.worker_session_id.as_deref().unwrap_or(""),
                "session succeeded"
            ),
            Some(err) => {
                failed += 1;
                error!(
                    job_id = %outcome.job_id,
                    session_index = outcome.session_index,
                    code = err.code(),
                    %err,
                    "session failed"
                );
            }
        }
    }

    if failed > 0 {
        return Err(AppError::Worker {
            message: format!("{failed} of {} sessions failed", outcomes.len()),
            retryable: false,
        });
    }
    info!(sessions = outcomes.len(), "all sessions completed successfully");
    Ok(())
}

fn log_notification(notification: &TransferNotification) {
    match notification {
        TransferNotification::SessionsStarting { job_id } => info!(%job_id, "sessions starting"),
        TransferNotification::SessionStart {
            job_id,
            session_index,
        } => info!(%job_id, session_index, "session started"),
        TransferNotification::SessionSizeKnown {
            job_id,
            session_index,
            bytes_expected,
        } => info!(%job_id, session_index, bytes_expected, "session size known"),
        TransferNotification::TransferProgress {
            job_id,
            session_index,
            bytes_transferred,
        } => info!(%job_id, session_index, bytes_transferred, "transfer progress"),
        TransferNotification::SessionEnd {
            job_id,
            session_index,
        } => info!(%job_id, session_index, "session ended"),
        TransferNotification::End { job_id } => info!(%job_id, "transfer complete"),
    }
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match format {
        LogFormat::Text => fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => fmt().with_env_filter(filter).json().try_init(),
    };
    result.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
