//! Request and result shapes for agent runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Marker prefix identifying a failure rendered into result text.
pub const ERROR_MARKER: &str = "Error:";

/// Parameters for a single block-mode agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRunRequest {
    /// Instruction text; must not be blank.
    pub prompt: String,
    /// Absolute working directory for the agent.
    pub work_dir: PathBuf,
    /// Optional model tier name (allow-listed).
    pub model: Option<String>,
    /// Optional per-run timeout override.
    pub timeout: Option<Duration>,
    /// Existing session to continue.
    pub session_id: Option<String>,
}

impl AgentRunRequest {
    /// Request with defaults for everything but prompt and directory.
    #[must_use]
    pub fn new(prompt: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            work_dir: work_dir.into(),
            model: None,
            timeout: None,
            session_id: None,
        }
    }

    /// Set the model tier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the timeout override.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Continue an existing session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Check structural validity before anything is launched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` for a blank prompt, a relative
    /// working directory, or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "'prompt' is required and cannot be empty".into(),
            ));
        }
        if !self.work_dir.is_absolute() {
            return Err(AppError::InvalidRequest(format!(
                "working directory must be absolute: {}",
                self.work_dir.display()
            )));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(AppError::InvalidRequest("timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Outcome of a block-mode run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRunResult {
    /// Session the run belongs to.
    pub session_id: String,
    /// Extracted block text, or a rendered `Error:` report.
    pub output: String,
}

impl AgentRunResult {
    /// Whether the output is a rendered failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.output.starts_with(ERROR_MARKER)
    }
}

/// One entry of a fan-out batch request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSpec {
    /// Instruction text for this agent.
    pub prompt: String,
}

/// Indexed per-task outcome of a fan-out batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchResult {
    /// Position of the spec in the input list.
    pub index: usize,
    /// Agent output; empty when `error` is set.
    pub output: String,
    /// Failure description; empty on success.
    pub error: String,
}

impl BatchResult {
    /// Successful task result.
    #[must_use]
    pub fn success(index: usize, output: String) -> Self {
        Self {
            index,
            output,
            error: String::new(),
        }
    }

    /// Failed task result.
    #[must_use]
    pub fn failure(index: usize, error: String) -> Self {
        Self {
            index,
            output: String::new(),
            error,
        }
    }

    /// Whether the task failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Render an error into the uniform text shape.
#[must_use]
pub fn render_error(err: &crate::AppError) -> String {
    format!("{ERROR_MARKER} {err}")
}
