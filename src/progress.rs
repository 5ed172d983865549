//! Progress reporting
//!
//! Long-running operations (consistency scans, tree imports) push
//! [`ProgressUpdate`]s into a caller-supplied [`ProgressReporter`]. The
//! reporter decides what to do with them: forward to a job record, log them,
//! or drop them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A single progress notification
///
/// All fields are optional; reporters apply only what is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub total: Option<u64>,
    pub current: Option<u64>,
    pub increment: Option<u64>,
    pub message: Option<String>,
}

impl ProgressUpdate {
    /// Announce the amount of work and reset the counter
    pub fn started(total: u64) -> Self {
        Self {
            total: Some(total),
            current: Some(0),
            ..Default::default()
        }
    }

    /// One unit of work done
    pub fn step(message: impl Into<String>) -> Self {
        Self {
            increment: Some(1),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Status message without advancing the counter
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Sink for progress notifications
pub trait ProgressReporter: Send + Sync {
    fn update(&self, update: ProgressUpdate);
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&self, _update: ProgressUpdate) {}
}

/// Reporter that keeps every update, plus the running counters
#[derive(Debug, Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().clone()
    }

    /// Last announced total
    pub fn total(&self) -> Option<u64> {
        self.updates.lock().iter().rev().find_map(|u| u.total)
    }

    /// Counter value after applying every `current` and `increment` in order
    pub fn current(&self) -> u64 {
        self.updates.lock().iter().fold(0, |acc, u| {
            let base = u.current.unwrap_or(acc);
            base + u.increment.unwrap_or(0)
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.updates
            .lock()
            .iter()
            .filter_map(|u| u.message.clone())
            .collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn update(&self, update: ProgressUpdate) {
        self.updates.lock().push(update);
    }
}

impl<P: ProgressReporter + ?Sized> ProgressReporter for &P {
    fn update(&self, update: ProgressUpdate) {
        (**self).update(update)
    }
}
