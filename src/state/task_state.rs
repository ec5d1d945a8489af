/// Task state definitions for tracking crawl progress
///
/// A task moves `Queued -> Fetching -> {Success, Failed, Timeout}`. Only a
/// successful fetch goes on to `Discovering`; every path ends in `Done`.
use crate::HarvestError;
use std::fmt;

/// Represents the current state of one crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    // ===== Active States =====
    /// Task is in the frontier waiting for a worker
    Queued,

    /// Task holds a rate-limit slot and its fetch is in flight
    Fetching,

    // ===== Fetch Outcomes =====
    /// Content was fetched
    Success,

    /// Fetch failed (network, HTTP status, content mismatch, robots.txt)
    Failed,

    /// Fetch exceeded the per-fetch timeout
    Timeout,

    /// Links and records are being extracted from fetched content
    Discovering,

    // ===== Terminal State =====
    Done,
}

impl TaskState {
    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;

        matches!(
            (self, next),
            (Queued, Fetching)
                | (Fetching, Success)
                | (Fetching, Failed)
                | (Fetching, Timeout)
                | (Success, Discovering)
                | (Discovering, Done)
                | (Failed, Done)
                | (Timeout, Done)
        )
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow
    ///
    /// # Returns
    ///
    /// * `Ok(TaskState)` - The new state
    /// * `Err(HarvestError::InvalidTransition)` - If `next` is not a legal successor
    pub fn transition(self, next: TaskState) -> Result<TaskState, HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HarvestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Discovering => "discovering",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
