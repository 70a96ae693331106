//! Process launcher and timeout supervisor.
//!
//! [`ProcessLauncher::run`] starts a child through a [`ProcessTree`], drains
//! stdout and stderr concurrently with waiting for exit, emits rate-limited
//! progress heartbeats, and tears down the whole process group when the
//! deadline passes or the run is cancelled.

pub mod group;

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::environment::EnvMap;
use crate::models::progress::{ProgressEvent, ProgressReporter};
use crate::{AppError, Result};

pub use group::{platform_tree, GroupSignal, ProcessTree};

/// Fully resolved description of a child launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Working directory, if different from ours.
    pub work_dir: Option<PathBuf>,
    /// Complete child environment; nothing else is inherited.
    pub env: EnvMap,
}

impl LaunchSpec {
    /// Shell-quoted rendering of the command line for reports and logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        let program = self.program.to_string_lossy();
        shell_words::join(std::iter::once(program.as_ref()).chain(self.args.iter().map(String::as_str)))
    }
}

/// Captured result of a child that exited on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `-1` when the child was terminated by a signal.
    pub exit_code: i32,
    /// Captured stdout (lossy UTF-8).
    pub stdout: String,
    /// Captured stderr (lossy UTF-8).
    pub stderr: String,
    /// Wall-clock time from launch to exit.
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Stdout followed by stderr, with stderr starting on a fresh line.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        text.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
            text.push('\n');
        }
        text.push_str(&self.stderr);
        text
    }
}

type Drain = JoinHandle<io::Result<Vec<u8>>>;

/// Launches children and supervises them until exit, timeout, or cancel.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    tree: Arc<dyn ProcessTree>,
    settings: SupervisorConfig,
}

impl ProcessLauncher {
    /// Launcher using the platform's best [`ProcessTree`].
    #[must_use]
    pub fn new(settings: SupervisorConfig) -> Self {
        Self::with_tree(platform_tree(), settings)
    }

    /// Launcher using an explicit [`ProcessTree`].
    #[must_use]
    pub fn with_tree(tree: Arc<dyn ProcessTree>, settings: SupervisorConfig) -> Self {
        Self { tree, settings }
    }

    /// Run `spec` to completion.
    ///
    /// A non-zero exit code is returned verbatim, not as an error.
    ///
    /// # Errors
    ///
    /// - `AppError::LaunchFailure` if the child cannot be started.
    /// - `AppError::Timeout` if the deadline passes; the group is torn down.
    /// - `AppError::Cancelled` if `cancel` fires; the group is torn down.
    /// - `AppError::Io` if waiting on the child fails.
    pub async fn run(
        &self,
        spec: &LaunchSpec,
        timeout: Duration,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        let command_line = spec.command_line();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .env_clear()
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.work_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = self
            .tree
            .spawn(&mut cmd)
            .map_err(|err| AppError::LaunchFailure {
                command: command_line.clone(),
                reason: launch_reason(spec, &err),
            })?;
        let pid = child.id().unwrap_or(0);
        info!(
            pid,
            command = %command_line,
            tree = self.tree.name(),
            timeout_secs = timeout.as_secs_f64(),
            "agent process started"
        );

        let stdout = child.stdout.take().map(spawn_drain);
        let stderr = child.stderr.take().map(spawn_drain);

        let mut last_beat = started;
        let status = loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(pid, timeout_secs = timeout.as_secs_f64(), "agent deadline exceeded");
                self.terminate(&mut child, pid).await;
                abort_drains([stdout, stderr]);
                return Err(AppError::Timeout {
                    command: command_line,
                    timeout,
                });
            }

            let slice = remaining.min(self.settings.poll_interval());
            let waited = tokio::select! {
                () = cancel.cancelled() => None,
                waited = tokio::time::timeout(slice, child.wait()) => Some(waited),
            };

            match waited {
                None => {
                    warn!(pid, "agent run cancelled");
                    self.terminate(&mut child, pid).await;
                    abort_drains([stdout, stderr]);
                    return Err(AppError::Cancelled {
                        command: command_line,
                    });
                }
                Some(Ok(Ok(status))) => break status,
                Some(Ok(Err(err))) => {
                    self.terminate(&mut child, pid).await;
                    abort_drains([stdout, stderr]);
                    return Err(AppError::Io(format!("failed to wait for agent process: {err}")));
                }
                Some(Err(_elapsed)) => {
                    if last_beat.elapsed() >= self.settings.heartbeat_interval() {
                        last_beat = Instant::now();
                        debug!(pid, elapsed_secs = started.elapsed().as_secs(), "agent still running");
                        progress.report(ProgressEvent::new(1, None, "Agent running..."));
                    }
                }
            }
        };

        // Descendants may still hold the pipes open after the leader exits.
        let deadline = started + timeout;
        let aborts: Vec<AbortHandle> = [&stdout, &stderr]
            .into_iter()
            .flatten()
            .map(JoinHandle::abort_handle)
            .collect();
        let mut drained = Box::pin(read_drains(stdout, stderr));
        let (stdout, stderr) = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(pid, "agent descendants held output open past the deadline");
                self.terminate_lingering(&mut child, pid, &mut drained).await;
                abort_all(&aborts);
                return Err(AppError::Timeout {
                    command: command_line,
                    timeout,
                });
            }

            let slice = remaining.min(self.settings.poll_interval());
            let waited = tokio::select! {
                () = cancel.cancelled() => None,
                waited = tokio::time::timeout(slice, &mut drained) => Some(waited),
            };

            match waited {
                None => {
                    warn!(pid, "agent run cancelled while descendants held output open");
                    self.terminate_lingering(&mut child, pid, &mut drained).await;
                    abort_all(&aborts);
                    return Err(AppError::Cancelled {
                        command: command_line,
                    });
                }
                Some(Ok(streams)) => break streams,
                Some(Err(_elapsed)) => {
                    if last_beat.elapsed() >= self.settings.heartbeat_interval() {
                        last_beat = Instant::now();
                        debug!(pid, "agent exited; waiting for descendants to close output");
                        progress.report(ProgressEvent::new(1, None, "Agent running..."));
                    }
                }
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        let elapsed = started.elapsed();
        info!(
            pid,
            exit_code,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "agent process exited"
        );
        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            elapsed,
        })
    }

    /// Graceful signal to the group, bounded grace wait, then a forceful
    /// kill of whatever remains in the group. Idempotent.
    async fn terminate(&self, child: &mut Child, pid: u32) {
        if matches!(child.try_wait(), Ok(Some(_))) {
            debug!(pid, "agent already exited; nothing to terminate");
            return;
        }

        if let Err(err) = self.tree.signal_group(child, pid, GroupSignal::Graceful) {
            warn!(pid, %err, "failed to send graceful termination signal");
        }

        let grace = self.settings.grace_period();
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => debug!(pid, ?status, "agent exited after graceful signal"),
            Ok(Err(err)) => warn!(pid, %err, "error waiting for agent after graceful signal"),
            Err(_elapsed) => warn!(
                pid,
                grace_ms = self.settings.grace_period_ms,
                "agent ignored graceful signal; force killing group"
            ),
        }

        if let Err(err) = self.tree.signal_group(child, pid, GroupSignal::Forceful) {
            warn!(pid, %err, "failed to force-kill process group");
        }
        if let Err(err) = tokio::time::timeout(grace, child.wait()).await {
            warn!(pid, %err, "agent did not exit after forceful kill");
        }
    }

    /// Teardown for a group whose leader already exited but whose
    /// descendants still hold the output pipes. The grace wait ends early
    /// once both pipes close.
    async fn terminate_lingering<F>(&self, child: &mut Child, pid: u32, drained: &mut F)
    where
        F: Future + Unpin,
    {
        if let Err(err) = self.tree.signal_group(child, pid, GroupSignal::Graceful) {
            warn!(pid, %err, "failed to signal lingering process group");
        }
        if tokio::time::timeout(self.settings.grace_period(), drained)
            .await
            .is_err()
        {
            debug!(pid, "lingering descendants ignored graceful signal");
        }
        if let Err(err) = self.tree.signal_group(child, pid, GroupSignal::Forceful) {
            warn!(pid, %err, "failed to kill lingering process group");
        }
    }
}

fn spawn_drain<R>(mut reader: R) -> Drain
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

/// Both captured streams, once every writer has closed them.
async fn read_drains(stdout: Option<Drain>, stderr: Option<Drain>) -> (String, String) {
    (read_drain(stdout).await, read_drain(stderr).await)
}

async fn read_drain(drain: Option<Drain>) -> String {
    let Some(handle) = drain else {
        return String::new();
    };
    match handle.await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(err)) => {
            warn!(%err, "failed to read agent output stream");
            String::new()
        }
        Err(err) => {
            warn!(%err, "agent output reader task failed");
            String::new()
        }
    }
}

fn abort_all(handles: &[AbortHandle]) {
    for handle in handles {
        handle.abort();
    }
}

fn abort_drains(drains: [Option<Drain>; 2]) {
    for handle in drains.into_iter().flatten() {
        handle.abort();
    }
}

fn launch_reason(spec: &LaunchSpec, err: &io::Error) -> String {
    if err.kind() == io::ErrorKind::NotFound {
        format!(
            "executable not found: {}: {err}\n\
             Fix: install the agent CLI (e.g. `npm i -g @openai/codex`) and make sure \
             the PATH seen by this server includes it.",
            spec.program.display()
        )
    } else {
        format!("could not start {}: {err}", spec.program.display())
    }
}
