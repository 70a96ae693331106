#![forbid(unsafe_code)]

//! `codex-subagent`: run coding-agent CLI processes from the command line.
//!
//! Loads configuration, wires Ctrl-C/SIGTERM to a cancellation token, and
//! prints every result as JSON on stdout. Logs and progress go to stderr.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use codex_subagent::config::GlobalConfig;
use codex_subagent::models::progress::{ProgressEvent, ProgressReporter};
use codex_subagent::models::run::AgentRunRequest;
use codex_subagent::orchestrator::fan_out::FanOut;
use codex_subagent::orchestrator::review::{ReviewRequest, ReviewScope};
use codex_subagent::orchestrator::runner::AgentRunner;
use codex_subagent::orchestrator::RunContext;
use codex_subagent::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "codex-subagent", about = "Run coding-agent CLI processes", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Working directory for the agent (defaults to the current directory).
    #[arg(long)]
    work_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one agent and print its final message.
    Spawn {
        /// Task for the agent.
        prompt: String,
    },
    /// Run one agent in block mode, starting a new session.
    Exec {
        /// Task for the agent.
        prompt: String,
        /// Model tier, e.g. "gpt-5 high".
        #[arg(long)]
        model: Option<String>,
        /// Timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Continue an existing session.
    Continue {
        /// Session to continue.
        session_id: String,
        /// Follow-up message.
        message: String,
        /// Model tier, e.g. "gpt-5 high".
        #[arg(long)]
        model: Option<String>,
        /// Timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Review repository changes.
    Review {
        /// staged, unstaged, all, commit, or files.
        #[arg(long, default_value = "all")]
        scope: String,
        /// Commit or file list for scopes that need one.
        #[arg(long, default_value = "")]
        target: String,
        /// Extra reviewer instructions.
        #[arg(long, default_value = "")]
        prompt: String,
        /// Model tier, e.g. "gpt-5 high".
        #[arg(long)]
        model: Option<String>,
        /// Session to continue.
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Run a JSON array of `{"prompt": ...}` specs concurrently.
    Batch {
        /// JSON file; reads stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Inspect stored sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Debug, Subcommand)]
enum SessionAction {
    /// Print the turns of one session, or every session id.
    Show {
        /// Session to print.
        session_id: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = Arc::new(GlobalConfig::load(args.config.as_deref())?);
    let work_dir = match args.work_dir {
        Some(dir) => dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid work dir override: {err}")))?,
        None => std::env::current_dir()?,
    };
    info!(work_dir = %work_dir.display(), "configuration loaded");

    let runner = AgentRunner::new(Arc::clone(&config), work_dir.clone());

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    let (tx, rx) = mpsc::channel(64);
    let progress_handle = tokio::spawn(log_progress(rx));
    let ctx = RunContext::new(ProgressReporter::new(tx), ct);

    let outcome = dispatch(args.command, &runner, &work_dir, &ctx).await;
    drop(ctx);
    if let Err(err) = progress_handle.await {
        warn!(%err, "progress logger task failed");
    }
    outcome
}

async fn dispatch(
    command: Command,
    runner: &AgentRunner,
    work_dir: &Path,
    ctx: &RunContext,
) -> Result<()> {
    match command {
        Command::Spawn { prompt } => {
            let output = runner.spawn_agent(&prompt, work_dir, ctx).await;
            print_json(&serde_json::json!({ "output": output }))
        }
        Command::Exec {
            prompt,
            model,
            timeout,
        } => {
            let request = AgentRunRequest {
                prompt,
                work_dir: work_dir.to_path_buf(),
                model,
                timeout: timeout.map(Duration::from_secs),
                session_id: None,
            };
            print_json(&runner.execute(request, ctx).await)
        }
        Command::Continue {
            session_id,
            message,
            model,
            timeout,
        } => {
            let result = runner
                .continue_session(
                    &session_id,
                    &message,
                    work_dir,
                    model,
                    timeout.map(Duration::from_secs),
                    ctx,
                )
                .await;
            print_json(&result)
        }
        Command::Review {
            scope,
            target,
            prompt,
            model,
            session_id,
        } => {
            let review = ReviewRequest {
                scope: scope.parse::<ReviewScope>()?,
                target,
                prompt,
                work_dir: work_dir.to_path_buf(),
                model,
                timeout: None,
                session_id,
            };
            print_json(&runner.review(review, ctx).await)
        }
        Command::Batch { file } => {
            let value = read_batch(file.as_deref())?;
            let results = FanOut::new(runner).run_value(value, ctx).await?;
            print_json(&results)
        }
        Command::Session {
            action: SessionAction::Show { session_id },
        } => match session_id {
            Some(id) => {
                if !runner.sessions().contains(&id) {
                    return Err(AppError::Session(format!("unknown session '{id}'")));
                }
                print_json(&runner.sessions().get(&id))
            }
            None => print_json(&runner.sessions().session_ids()),
        },
    }
}

/// Batch input from `file`, or stdin when absent.
fn read_batch(file: Option<&Path>) -> Result<serde_json::Value> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(format!("failed to render result: {err}")))?;
    println!("{text}");
    Ok(())
}

async fn log_progress(mut rx: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        info!(
            progress = event.progress,
            total = event.total,
            message = %event.message,
            "progress"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
