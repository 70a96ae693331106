//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of characters echoed from arbitrary captured output.
pub const PREVIEW_CHARS: usize = 2000;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Caller supplied a structurally invalid request.
    InvalidRequest(String),
    /// The child executable could not be found or started.
    LaunchFailure {
        /// Rendered command line that was attempted.
        command: String,
        /// Underlying reason, including remediation guidance.
        reason: String,
    },
    /// The child did not exit before its deadline and was torn down.
    Timeout {
        /// Rendered command line that was attempted.
        command: String,
        /// Deadline that was exceeded.
        timeout: Duration,
    },
    /// The run was cancelled externally and the child was torn down.
    Cancelled {
        /// Rendered command line that was attempted.
        command: String,
    },
    /// The child ran and exited with a failure status.
    NonZeroExit {
        /// Rendered command line that was attempted.
        command: String,
        /// Working directory of the child.
        work_dir: PathBuf,
        /// Exit code; `-1` when the child was killed by a signal.
        exit_code: i32,
        /// Captured stdout (bounded when rendered).
        stdout: String,
        /// Captured stderr (bounded when rendered).
        stderr: String,
        /// Optional targeted remediation hint.
        hint: Option<String>,
    },
    /// The child succeeded but produced no block accepted by the filter.
    NoMatch {
        /// Rendered command line that produced the output.
        command: String,
        /// Bounded preview of the unmatched text.
        preview: String,
    },
    /// Pre-flight check found required variables missing or empty.
    MissingRequiredEnv {
        /// Sorted names of the missing variables.
        missing: Vec<String>,
        /// Warning from best-effort shell sourcing, if it failed.
        shell_warning: Option<String>,
    },
    /// Sourcing shell startup files to recover variables failed.
    ShellSourcing(String),
    /// Session store persistence failure.
    Session(String),
}

impl AppError {
    /// Whether this failure happened before any agent process was launched.
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidRequest(_) | Self::MissingRequiredEnv { .. }
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::LaunchFailure { command, reason } => {
                write!(f, "Failed to launch agent: {reason}\nCommand: {command}")
            }
            Self::Timeout { command, timeout } => write!(
                f,
                "Agent timed out.\nCommand: {command}\nTimeout Seconds: {}",
                timeout.as_secs_f64()
            ),
            Self::Cancelled { command } => {
                write!(f, "Agent run was cancelled.\nCommand: {command}")
            }
            Self::NonZeroExit {
                command,
                work_dir,
                exit_code,
                stdout,
                stderr,
                hint,
            } => {
                writeln!(f, "Agent exited with a non-zero status.")?;
                writeln!(f, "Command: {command}")?;
                writeln!(f, "Working Directory: {}", work_dir.display())?;
                write!(f, "Exit Code: {exit_code}")?;
                if let Some(hint) = hint {
                    write!(f, "\n{hint}")?;
                }
                if !stderr.trim().is_empty() {
                    write!(f, "\nStderr: {}", preview(stderr))?;
                }
                if !stdout.trim().is_empty() {
                    write!(f, "\nStdout: {}", preview(stdout))?;
                }
                Ok(())
            }
            Self::NoMatch { command, preview } => write!(
                f,
                "No output blocks found in agent output.\nCommand: {command}\nOutput Preview: {preview}"
            ),
            Self::MissingRequiredEnv {
                missing,
                shell_warning,
            } => {
                write!(f, "{}", missing_env_report(missing))?;
                if let Some(warning) = shell_warning {
                    write!(f, "\nShell environment sourcing also failed: {warning}")?;
                }
                Ok(())
            }
            Self::ShellSourcing(msg) => write!(f, "shell environment: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(format!("invalid json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Render the actionable report for missing required variables.
#[must_use]
pub fn missing_env_report(missing: &[String]) -> String {
    [
        format!(
            "Missing required environment variable(s): {}.",
            missing.join(", ")
        ),
        "Fix: export the variable(s) in the environment that launches this server.".to_owned(),
        "If your client sanitizes env vars, enable shell env sourcing (default) or use `.env` injection:"
            .to_owned(),
        "  - CODEX_SUBAGENT_SOURCE_SHELL_ENV=1".to_owned(),
        "  - CODEX_SUBAGENT_LOAD_DOTENV=1".to_owned(),
    ]
    .join("\n")
}

/// Truncate arbitrary output to [`PREVIEW_CHARS`] characters.
#[must_use]
pub fn preview(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}... [truncated]", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}
