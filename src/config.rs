//! Global configuration parsing, validation, and environment overrides.
//!
//! The configuration is built once at startup (TOML file, then
//! `CODEX_SUBAGENT_*` environment overrides) and shared immutably through
//! `Arc<GlobalConfig>`. Nothing in the crate mutates it after validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::model::ModelTier;
use crate::{AppError, Result};

/// Default timeout for a spawned agent run: eight hours.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 8 * 60 * 60;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "CODEX_SUBAGENT_";

/// Approval policy flag emitted on the agent command line.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// `--full-auto`: sandboxed workspace writes without prompting.
    #[default]
    FullAuto,
    /// `--dangerously-bypass-approvals-and-sandbox`.
    Bypass,
}

/// Settings for the launched agent executable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AgentConfig {
    /// Executable name or absolute path.
    pub executable: String,
    /// Subcommand placed right after the executable.
    pub subcommand: String,
    /// Default model tier; `None` lets the executable choose.
    pub model: Option<String>,
    /// Default wall-clock timeout for a run.
    pub timeout_seconds: u64,
    /// Approval policy flag.
    pub approval: ApprovalPolicy,
    /// Rewrite privileged flags into read-only equivalents before launch.
    pub safe_mode: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            executable: "codex".into(),
            subcommand: "exec".into(),
            model: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            approval: ApprovalPolicy::FullAuto,
            safe_mode: false,
        }
    }
}

/// Settings for assembling the child environment.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct EnvConfig {
    /// Load a dotenv file from the working directory.
    pub load_dotenv: bool,
    /// Dotenv file name, relative to the working directory.
    pub dotenv_path: String,
    /// Let dotenv values replace variables already present.
    pub dotenv_override: bool,
    /// Source shell startup files to recover stripped variables.
    pub source_shell_env: bool,
    /// Explicit shell executable.
    pub shell: Option<String>,
    /// Startup files to source; `None` selects the built-in list.
    pub shell_rc_files: Option<Vec<String>>,
    /// Bound on the shell sourcing run, in milliseconds.
    pub shell_env_timeout_ms: u64,
    /// Let shell values replace every variable, not only `PATH`.
    pub shell_env_override: bool,
    /// Variables that must be non-empty before an agent is launched.
    pub required_vars: Vec<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            load_dotenv: false,
            dotenv_path: ".env".into(),
            dotenv_override: false,
            source_shell_env: true,
            shell: None,
            shell_rc_files: None,
            shell_env_timeout_ms: 5_000,
            shell_env_override: false,
            required_vars: Vec::new(),
        }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SessionConfig {
    /// Backing JSON file for all sessions.
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sessions.json"),
        }
    }
}

/// Block extraction settings for block-mode runs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ExtractConfig {
    /// Accepted block tags; empty accepts every tag.
    pub tags: Vec<String>,
    /// Keep only the most recent N accepted blocks.
    pub limit: Option<usize>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            tags: vec!["codex".into()],
            limit: Some(1),
        }
    }
}

/// Timing knobs for the process supervisor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SupervisorConfig {
    /// Longest single wait on the child before re-checking the deadline.
    pub poll_interval_ms: u64,
    /// Minimum spacing between progress heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Wait after the graceful signal before force-killing the group.
    pub grace_period_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            heartbeat_interval_ms: 2_000,
            grace_period_ms: 5_000,
        }
    }
}

impl SupervisorConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Termination grace period as a [`Duration`].
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Global configuration parsed from TOML and environment overrides.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Agent executable settings.
    pub agent: AgentConfig,
    /// Child environment settings.
    pub env: EnvConfig,
    /// Session persistence settings.
    pub sessions: SessionConfig,
    /// Block extraction settings.
    pub extract: ExtractConfig,
    /// Supervisor timing.
    pub supervisor: SupervisorConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the startup configuration: optional TOML file, then overrides
    /// from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file is unreadable or the merged
    /// result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `CODEX_SUBAGENT_*` overrides read through `lookup`.
    ///
    /// Malformed numeric values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = get("LOAD_DOTENV") {
            self.env.load_dotenv = is_truthy(&value);
        }
        if let Some(value) = get("DOTENV_PATH").filter(|v| !v.trim().is_empty()) {
            self.env.dotenv_path = value;
        }
        if let Some(value) = get("DOTENV_OVERRIDE") {
            self.env.dotenv_override = is_truthy(&value);
        }
        if let Some(value) = get("SOURCE_SHELL_ENV") {
            self.env.source_shell_env = !is_falsy(&value);
        }
        if let Some(value) = get("SHELL").filter(|v| !v.trim().is_empty()) {
            self.env.shell = Some(value);
        }
        if let Some(value) = get("SHELL_RC_FILES") {
            let files = split_csv(&value);
            if !files.is_empty() {
                self.env.shell_rc_files = Some(files);
            }
        }
        if let Some(value) = get("SHELL_ENV_TIMEOUT_SECONDS") {
            match value.trim().parse::<f64>() {
                Ok(secs) if secs.is_finite() => {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let ms = (secs.max(0.1) * 1000.0) as u64;
                    self.env.shell_env_timeout_ms = ms;
                }
                _ => warn!(value, "ignoring malformed shell env timeout override"),
            }
        }
        if let Some(value) = get("SHELL_ENV_OVERRIDE") {
            self.env.shell_env_override = is_truthy(&value);
        }
        if let Some(value) = get("REQUIRED_ENV_VARS") {
            self.env.required_vars = split_csv(&value);
        }
        if let Some(value) = get("AGENT_TIMEOUT_SECONDS") {
            match value.trim().parse::<f64>() {
                Ok(secs) if secs.is_finite() => {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let whole = secs.max(1.0) as u64;
                    self.agent.timeout_seconds = whole;
                }
                _ => warn!(value, "ignoring malformed agent timeout override"),
            }
        }
        if let Some(value) = get("SAFE_MODE") {
            self.agent.safe_mode = is_truthy(&value);
        }
        if let Some(value) = get("YOLO") {
            if is_truthy(&value) {
                self.agent.approval = ApprovalPolicy::Bypass;
            }
        }
        if let Some(value) = get("EXECUTABLE").filter(|v| !v.trim().is_empty()) {
            self.agent.executable = value;
        }
        if let Some(value) = get("MODEL").filter(|v| !v.trim().is_empty()) {
            self.agent.model = Some(value);
        }
        if let Some(value) = get("SESSIONS_PATH").filter(|v| !v.trim().is_empty()) {
            self.sessions.path = PathBuf::from(value);
        }
    }

    /// Default run timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_seconds)
    }

    /// Default model tier, if the configured value is on the allow-list.
    #[must_use]
    pub fn default_model(&self) -> Option<ModelTier> {
        self.agent.model.as_deref().and_then(ModelTier::parse_or_warn)
    }

    fn validate(&self) -> Result<()> {
        if self.agent.executable.trim().is_empty() {
            return Err(AppError::Config("agent.executable must not be empty".into()));
        }
        if self.agent.subcommand.trim().is_empty() {
            return Err(AppError::Config("agent.subcommand must not be empty".into()));
        }
        if self.agent.timeout_seconds == 0 {
            return Err(AppError::Config(
                "agent.timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.env.shell_env_timeout_ms == 0 {
            return Err(AppError::Config(
                "env.shell_env_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.supervisor.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "supervisor.poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Whether a configuration token reads as "on".
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Whether a configuration token reads as "off".
#[must_use]
pub fn is_falsy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "n" | "off"
    )
}

/// Split a comma-separated list, dropping blank entries.
#[must_use]
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}
