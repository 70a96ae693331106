//! Progress notifications delivered to an external observer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// A single progress notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Progress counter (task index in batches, `0`/`1` for single runs).
    pub progress: u64,
    /// Total count when known.
    pub total: Option<u64>,
    /// Human-readable status line.
    pub message: String,
}

impl ProgressEvent {
    /// Construct an event.
    #[must_use]
    pub fn new(progress: u64, total: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            progress,
            total,
            message: message.into(),
        }
    }
}

/// Best-effort sender for [`ProgressEvent`]s.
///
/// Reporting never fails the caller: a missing, full, or closed channel
/// drops the event.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Reporter forwarding into `tx`.
    #[must_use]
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Reporter that discards every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Send an event without waiting.
    pub fn report(&self, event: ProgressEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.try_send(event) {
            debug!(%err, "progress event dropped");
        }
    }
}
