//! Agent orchestration.
//!
//! Covers command construction, the single-agent run path with session
//! continuity, review prompts, and concurrent fan-out.

pub mod command;
pub mod fan_out;
pub mod review;
pub mod runner;

use tokio_util::sync::CancellationToken;

use crate::models::progress::ProgressReporter;

/// Per-call observer and cancellation handle.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Destination for progress notifications.
    pub progress: ProgressReporter,
    /// Cancels the run and tears down its process group.
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Context reporting into `progress`, cancelled by `cancel`.
    #[must_use]
    pub fn new(progress: ProgressReporter, cancel: CancellationToken) -> Self {
        Self { progress, cancel }
    }

    /// Context for a sub-task: same reporter, child cancellation token.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            progress: self.progress.clone(),
            cancel: self.cancel.child_token(),
        }
    }
}
