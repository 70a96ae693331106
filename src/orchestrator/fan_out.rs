//! Concurrent fan-out of independent agent runs.
//!
//! All tasks are multiplexed onto the calling task with `join_all`; the only
//! real parallelism is between the child processes themselves. A task's
//! failure, including a panic, becomes that task's `error` and never reaches
//! its siblings. Results are returned in input order.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_util::future::join_all;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::models::progress::ProgressEvent;
use crate::models::run::{render_error, AgentSpec, BatchResult, ERROR_MARKER};
use crate::{AppError, Result};

use super::runner::AgentRunner;
use super::RunContext;

/// Boxed future returned by [`SpawnAgent::spawn`].
pub type SpawnFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// One "spawn an agent for this prompt" operation.
pub trait SpawnAgent: Send + Sync {
    /// Run one agent for `prompt` and return its output text.
    fn spawn<'a>(&'a self, prompt: String, ctx: RunContext) -> SpawnFuture<'a>;
}

impl SpawnAgent for AgentRunner {
    fn spawn<'a>(&'a self, prompt: String, ctx: RunContext) -> SpawnFuture<'a> {
        Box::pin(async move {
            self.try_spawn_agent(&prompt, self.default_work_dir(), &ctx)
                .await
        })
    }
}

/// Runs many [`SpawnAgent`] operations concurrently.
pub struct FanOut<'a> {
    agent: &'a dyn SpawnAgent,
}

impl<'a> FanOut<'a> {
    /// Coordinator dispatching to `agent`.
    #[must_use]
    pub fn new(agent: &'a dyn SpawnAgent) -> Self {
        Self { agent }
    }

    /// Run every spec concurrently.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` only when `specs` is empty.
    pub async fn run_all(&self, specs: Vec<AgentSpec>, ctx: &RunContext) -> Result<Vec<BatchResult>> {
        if specs.is_empty() {
            return Err(AppError::InvalidRequest("'agents' list cannot be empty".into()));
        }
        Ok(self.run_entries(specs.into_iter().map(Ok).collect(), ctx).await)
    }

    /// Run a batch given as untyped JSON.
    ///
    /// Elements that are not objects with a string `prompt` fail
    /// individually; the rest still run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` when `value` is not an array or is
    /// an empty array.
    pub async fn run_value(&self, value: Value, ctx: &RunContext) -> Result<Vec<BatchResult>> {
        let Value::Array(items) = value else {
            return Err(AppError::InvalidRequest(
                "'agents' must be a list of agent specs".into(),
            ));
        };
        if items.is_empty() {
            return Err(AppError::InvalidRequest("'agents' list cannot be empty".into()));
        }
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item.get("prompt") {
                Some(Value::String(prompt)) => Ok(AgentSpec {
                    prompt: prompt.clone(),
                }),
                _ => Err(format!(
                    "Agent {index}: spec must be an object with a 'prompt' field."
                )),
            })
            .collect();
        Ok(self.run_entries(entries, ctx).await)
    }

    async fn run_entries(
        &self,
        entries: Vec<std::result::Result<AgentSpec, String>>,
        ctx: &RunContext,
    ) -> Vec<BatchResult> {
        let total = entries.len();
        info!(total, "starting agent fan-out");

        let tasks = entries.into_iter().enumerate().map(|(index, entry)| {
            let task_ctx = ctx.child();
            async move {
                let spec = match entry {
                    Ok(spec) => spec,
                    Err(message) => return BatchResult::failure(index, message),
                };
                self.run_one(index, total, spec, task_ctx)
                    .instrument(info_span!("fan_out_task", index))
                    .await
            }
        });

        let results = join_all(tasks).await;
        let failed = results.iter().filter(|r| r.is_error()).count();
        info!(total, failed, "agent fan-out finished");
        results
    }

    async fn run_one(
        &self,
        index: usize,
        total: usize,
        spec: AgentSpec,
        ctx: RunContext,
    ) -> BatchResult {
        ctx.progress.report(ProgressEvent::new(
            index as u64,
            Some(total as u64),
            format!("Starting agent {}/{total}...", index + 1),
        ));

        let outcome = AssertUnwindSafe(self.agent.spawn(spec.prompt, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) if output.starts_with(ERROR_MARKER) => {
                warn!(index, "agent reported an error");
                BatchResult::failure(index, output)
            }
            Ok(Ok(output)) => BatchResult::success(index, output),
            Ok(Err(err)) => {
                warn!(index, %err, "agent task failed");
                BatchResult::failure(index, render_error(&err))
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                warn!(index, %detail, "agent task panicked");
                BatchResult::failure(index, format!("Unexpected error: {detail}"))
            }
        }
    }
}
