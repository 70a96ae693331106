//! Single-agent run path.
//!
//! Every public operation here converts failures into the uniform result
//! shape (text beginning with `Error:`) instead of returning them, so batch
//! callers can always tell a failed task from a failed batch. The `try_*`
//! variants expose the typed error for callers that want it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::environment::{EnvResolver, ResolvedEnv};
use crate::errors::{missing_env_report, preview};
use crate::extract::{parse_captured, TagFilter};
use crate::models::model::ModelTier;
use crate::models::progress::ProgressEvent;
use crate::models::run::{render_error, AgentRunRequest, AgentRunResult};
use crate::models::session::Role;
use crate::persistence::session_store::SessionStore;
use crate::process::{LaunchSpec, ProcessLauncher, ProcessOutput};
use crate::{AppError, Result};

use super::command::{resolve_executable, AgentCommand};
use super::review::ReviewRequest;
use super::RunContext;

/// File the agent writes its final message to in single-response mode.
const LAST_MESSAGE_FILE: &str = "last_message.md";

/// Orchestrates environment, launch, extraction, and session bookkeeping.
#[derive(Debug)]
pub struct AgentRunner {
    config: Arc<GlobalConfig>,
    resolver: EnvResolver,
    launcher: ProcessLauncher,
    sessions: SessionStore,
    filter: TagFilter,
    default_work_dir: PathBuf,
}

impl AgentRunner {
    /// Runner built from `config`, with sessions persisted at
    /// `config.sessions.path` and `default_work_dir` used by
    /// [`spawn_agent_default`](Self::spawn_agent_default).
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, default_work_dir: PathBuf) -> Self {
        let sessions = SessionStore::open(config.sessions.path.clone());
        let launcher = ProcessLauncher::new(config.supervisor.clone());
        Self::with_parts(config, launcher, sessions, default_work_dir)
    }

    /// Runner from explicit parts.
    #[must_use]
    pub fn with_parts(
        config: Arc<GlobalConfig>,
        launcher: ProcessLauncher,
        sessions: SessionStore,
        default_work_dir: PathBuf,
    ) -> Self {
        Self {
            resolver: EnvResolver::new(config.env.clone()),
            filter: TagFilter::of(&config.extract.tags),
            config,
            launcher,
            sessions,
            default_work_dir,
        }
    }

    /// Session store owned by this runner.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Directory used when a caller does not name one.
    #[must_use]
    pub fn default_work_dir(&self) -> &Path {
        &self.default_work_dir
    }

    // ── Single-response mode ────────────────────────────────────────

    /// Run one agent and return its final message, or an `Error:` report.
    pub async fn spawn_agent(&self, prompt: &str, work_dir: &Path, ctx: &RunContext) -> String {
        match self.try_spawn_agent(prompt, work_dir, ctx).await {
            Ok(output) => output,
            Err(err) => {
                warn!(%err, "spawn_agent failed");
                render_error(&err)
            }
        }
    }

    /// [`spawn_agent`](Self::spawn_agent) in the default working directory.
    pub async fn spawn_agent_default(&self, prompt: &str, ctx: &RunContext) -> String {
        self.spawn_agent(prompt, &self.default_work_dir, ctx).await
    }

    /// Run one agent in single-response mode.
    ///
    /// The agent writes its final message into a fresh temp file; the
    /// trimmed file content is returned, falling back to trimmed stdout when
    /// the file is empty.
    ///
    /// # Errors
    ///
    /// Any of the launch, environment, timeout, or non-zero-exit failures.
    pub async fn try_spawn_agent(
        &self,
        prompt: &str,
        work_dir: &Path,
        ctx: &RunContext,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "'prompt' is required and cannot be empty".into(),
            ));
        }

        let span = info_span!("spawn_agent", work_dir = %work_dir.display());
        self.run_single_response(prompt, work_dir, ctx)
            .instrument(span)
            .await
    }

    async fn run_single_response(
        &self,
        prompt: &str,
        work_dir: &Path,
        ctx: &RunContext,
    ) -> Result<String> {
        let env = self.resolver.resolve(work_dir).await?;
        let program = resolve_executable(&self.config.agent.executable, &env.vars, work_dir)?;

        let temp_dir = tempfile::Builder::new()
            .prefix("codex_output_")
            .tempdir()
            .map_err(|err| AppError::Io(format!("failed to create output directory: {err}")))?;
        let output_path = temp_dir.path().join(LAST_MESSAGE_FILE);
        std::fs::File::create(&output_path)
            .map_err(|err| AppError::Io(format!("failed to create output file: {err}")))?;

        let args = AgentCommand::new(&self.config.agent, work_dir, prompt)
            .model(self.config.default_model())
            .output_file(&output_path)
            .args();
        let spec = self.launch_spec(program, args, work_dir, env);

        ctx.progress
            .report(ProgressEvent::new(0, None, "Launching agent..."));
        let output = self
            .launcher
            .run(&spec, self.config.default_timeout(), &ctx.progress, &ctx.cancel)
            .await?;

        let last_message = std::fs::read_to_string(&output_path)
            .map(|text| text.trim().to_owned())
            .unwrap_or_default();

        if output.exit_code != 0 {
            let mut err = non_zero_exit(&spec, &output);
            if let AppError::NonZeroExit { hint, .. } = &mut err {
                if !last_message.is_empty() {
                    let captured = format!("Captured Output: {}", preview(&last_message));
                    *hint = Some(match hint.take() {
                        Some(existing) => format!("{existing}\n{captured}"),
                        None => captured,
                    });
                }
            }
            return Err(err);
        }

        if last_message.is_empty() {
            Ok(output.stdout.trim().to_owned())
        } else {
            Ok(last_message)
        }
    }

    // ── Block mode with sessions ────────────────────────────────────

    /// Run one agent in block mode, continuing or starting a session.
    pub async fn execute(&self, request: AgentRunRequest, ctx: &RunContext) -> AgentRunResult {
        if let Err(err) = request.validate() {
            return AgentRunResult {
                session_id: request.session_id.unwrap_or_default(),
                output: render_error(&err),
            };
        }

        let session_id = match &request.session_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => match self.sessions.new_session() {
                Ok(id) => id,
                Err(err) => {
                    return AgentRunResult {
                        session_id: String::new(),
                        output: render_error(&err),
                    }
                }
            },
        };

        let span = info_span!("execute", session_id = %session_id);
        let output = match self
            .try_execute(&session_id, &request, ctx)
            .instrument(span)
            .await
        {
            Ok(output) => output,
            Err(err) => {
                warn!(%session_id, %err, "agent run failed");
                render_error(&err)
            }
        };
        AgentRunResult { session_id, output }
    }

    /// Continue `session_id` with `message`.
    pub async fn continue_session(
        &self,
        session_id: &str,
        message: &str,
        work_dir: &Path,
        model: Option<String>,
        timeout: Option<Duration>,
        ctx: &RunContext,
    ) -> AgentRunResult {
        if session_id.trim().is_empty() {
            return AgentRunResult {
                session_id: String::new(),
                output: render_error(&AppError::InvalidRequest(
                    "'session_id' is required to continue a session".into(),
                )),
            };
        }
        let request = AgentRunRequest {
            prompt: message.to_owned(),
            work_dir: work_dir.to_path_buf(),
            model,
            timeout,
            session_id: Some(session_id.to_owned()),
        };
        self.execute(request, ctx).await
    }

    /// Run a review of repository changes.
    pub async fn review(&self, review: ReviewRequest, ctx: &RunContext) -> AgentRunResult {
        let fallback_id = review.session_id.clone().unwrap_or_default();
        match review.into_run_request() {
            Ok(request) => self.execute(request, ctx).await,
            Err(err) => AgentRunResult {
                session_id: fallback_id,
                output: render_error(&err),
            },
        }
    }

    /// Block-mode run for an already-chosen session; returns the output text.
    ///
    /// On success the user message and the agent output are appended to
    /// the session, in that order.
    ///
    /// # Errors
    ///
    /// Any of the environment, launch, timeout, exit, or extraction failures.
    pub async fn try_execute(
        &self,
        session_id: &str,
        request: &AgentRunRequest,
        ctx: &RunContext,
    ) -> Result<String> {
        request.validate()?;

        let model = request
            .model
            .as_deref()
            .or(self.config.agent.model.as_deref())
            .and_then(ModelTier::parse_or_warn);
        let timeout = request.timeout.unwrap_or_else(|| self.config.default_timeout());

        let env = self.resolver.resolve(&request.work_dir).await?;
        let program =
            resolve_executable(&self.config.agent.executable, &env.vars, &request.work_dir)?;

        let final_prompt = self.sessions.compose_prompt(session_id, &request.prompt);
        let args = AgentCommand::new(&self.config.agent, &request.work_dir, &final_prompt)
            .model(model)
            .args();
        let spec = self.launch_spec(program, args, &request.work_dir, env);

        ctx.progress
            .report(ProgressEvent::new(0, None, "Launching agent..."));
        let output = self
            .launcher
            .run(&spec, timeout, &ctx.progress, &ctx.cancel)
            .await?;

        let command_line = spec.command_line();
        let blocks = parse_captured(
            &command_line,
            &request.work_dir,
            output.exit_code,
            &output.combined(),
            &self.filter,
            self.config.extract.limit,
        )
        .map_err(|err| match err {
            AppError::NonZeroExit { .. } => non_zero_exit(&spec, &output),
            other => other,
        })?;

        let text: String = blocks.iter().map(|block| block.raw.as_str()).collect();
        info!(
            session_id,
            blocks = blocks.len(),
            exit_code = output.exit_code,
            "agent run completed"
        );

        for (role, content) in [(Role::User, request.prompt.as_str()), (Role::Assistant, text.as_str())] {
            if let Err(err) = self.sessions.append(session_id, role, content) {
                warn!(session_id, %err, "failed to persist session turn");
            }
        }
        Ok(text)
    }

    fn launch_spec(
        &self,
        program: PathBuf,
        args: Vec<String>,
        work_dir: &Path,
        env: ResolvedEnv,
    ) -> LaunchSpec {
        for warning in &env.warnings {
            warn!(%warning, "environment resolved with warnings");
        }
        LaunchSpec {
            program,
            args,
            work_dir: Some(work_dir.to_path_buf()),
            env: env.vars,
        }
    }
}

/// Build a `NonZeroExit` report from a finished run.
fn non_zero_exit(spec: &LaunchSpec, output: &ProcessOutput) -> AppError {
    AppError::NonZeroExit {
        command: spec.command_line(),
        work_dir: spec.work_dir.clone().unwrap_or_default(),
        exit_code: output.exit_code,
        stdout: output.stdout.clone(),
        stderr: output.stderr.clone(),
        hint: missing_env_var(&output.stderr).map(|name| missing_env_report(&[name])),
    }
}

static MISSING_ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Missing environment variable:\s*[`'"]?([A-Z0-9_]+)[`'"]?"#)
        .unwrap_or_else(|err| unreachable!("missing-variable pattern is valid: {err}"))
});

/// Name of the variable in a `Missing environment variable: NAME` message.
#[must_use]
pub fn missing_env_var(stderr: &str) -> Option<String> {
    MISSING_ENV_VAR
        .captures(stderr)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().to_owned())
}
