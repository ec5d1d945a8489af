//! Progress events broadcast during a crawl

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// How one task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum TaskOutcome {
    Success { status_code: u16, duration: Duration },
    Failed { reason: String },
    Timeout,
    /// Finished after cancellation; result thrown away
    Discarded,
    /// Redirected onto a page another task already covers
    Duplicate { final_url: String },
}

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// Frontier exhausted with nothing in flight
    #[default]
    Completed,
    /// `max-pages` tasks were started
    MaxPages,
    Cancelled,
    GlobalTimeout,
    /// A rate-limit slot would have started after the global deadline
    RateLimitTimeout,
}

impl TerminationReason {
    /// Whether the aggregate may be missing pages the crawl would have visited
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::GlobalTimeout | Self::RateLimitTimeout
        )
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::MaxPages => "page limit reached",
            Self::Cancelled => "cancelled",
            Self::GlobalTimeout => "global timeout reached",
            Self::RateLimitTimeout => "rate limit slot past deadline",
        })
    }
}

/// Totals for one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub pages_started: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub discarded: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub discovered_total: usize,
    pub duration: Duration,
    pub termination: TerminationReason,
    pub warnings: Vec<String>,
}

impl CrawlSummary {
    pub fn new(termination: TerminationReason) -> Self {
        Self {
            termination,
            ..Self::default()
        }
    }

    /// Counts one finished task
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Success { .. } => self.succeeded += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
            TaskOutcome::Timeout => self.timed_out += 1,
            TaskOutcome::Discarded => self.discarded += 1,
            TaskOutcome::Duplicate { .. } => self.duplicates += 1,
        }
    }
}

/// Events sent to every [`super::CrawlHandle::subscribe`] receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    TaskStarted { url: String, depth: u32 },
    TaskCompleted { url: String, outcome: TaskOutcome },
    PagesDiscovered { url: String, count: usize },
    CrawlComplete(CrawlSummary),
}
