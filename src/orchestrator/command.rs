//! Agent command-line construction.
//!
//! Produces the argument vector
//! `<subcommand> [model flags] --cd <dir> --skip-git-repo-check <policy>
//! [--output-last-message <file>] <prompt>` and resolves the executable
//! against the child's resolved `PATH`.

use std::path::{Path, PathBuf};

use crate::config::{AgentConfig, ApprovalPolicy};
use crate::environment::EnvMap;
use crate::extract::{apply_safe_mode, BYPASS_FLAG};
use crate::models::model::ModelTier;
use crate::{AppError, Result};

/// Flag selecting sandboxed automatic execution.
pub const FULL_AUTO_FLAG: &str = "--full-auto";

/// Builder for one agent invocation's arguments.
#[derive(Debug, Clone)]
pub struct AgentCommand<'a> {
    config: &'a AgentConfig,
    work_dir: &'a Path,
    prompt: &'a str,
    model: Option<ModelTier>,
    output_file: Option<&'a Path>,
}

impl<'a> AgentCommand<'a> {
    /// Command running `prompt` inside `work_dir`.
    #[must_use]
    pub fn new(config: &'a AgentConfig, work_dir: &'a Path, prompt: &'a str) -> Self {
        Self {
            config,
            work_dir,
            prompt,
            model: None,
            output_file: None,
        }
    }

    /// Select a model tier.
    #[must_use]
    pub fn model(mut self, model: Option<ModelTier>) -> Self {
        self.model = model;
        self
    }

    /// Ask the agent to write its final message to `path`.
    #[must_use]
    pub fn output_file(mut self, path: &'a Path) -> Self {
        self.output_file = Some(path);
        self
    }

    /// Arguments as written, before any safe-mode rewrite.
    #[must_use]
    pub fn raw_args(&self) -> Vec<String> {
        let mut args = vec![self.config.subcommand.clone()];
        if let Some(model) = self.model {
            args.extend(model.to_args());
        }
        args.push("--cd".into());
        args.push(self.work_dir.to_string_lossy().into_owned());
        args.push("--skip-git-repo-check".into());
        args.push(
            match self.config.approval {
                ApprovalPolicy::FullAuto => FULL_AUTO_FLAG,
                ApprovalPolicy::Bypass => BYPASS_FLAG,
            }
            .into(),
        );
        if let Some(path) = self.output_file {
            args.push("--output-last-message".into());
            args.push(path.to_string_lossy().into_owned());
        }
        args.push(self.prompt.to_owned());
        args
    }

    /// Arguments to launch with, safe-mode rewrite applied.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        apply_safe_mode(&self.raw_args(), self.config.safe_mode)
    }
}

/// Locate `executable` using the child's `PATH`.
///
/// Absolute or relative paths containing a separator are used as given.
///
/// # Errors
///
/// Returns `AppError::LaunchFailure` with install guidance when the
/// executable cannot be found.
pub fn resolve_executable(executable: &str, env: &EnvMap, work_dir: &Path) -> Result<PathBuf> {
    let candidate = Path::new(executable);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return Ok(candidate.to_path_buf());
    }
    which::which_in(executable, env.get("PATH"), work_dir).map_err(|err| {
        AppError::LaunchFailure {
            command: executable.to_owned(),
            reason: format!(
                "{executable} CLI not found in PATH ({err}). Install it (e.g. `npm i -g @openai/codex`) \
                 and make sure the PATH seen by this server includes its bin directory."
            ),
        }
    })
}
