//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TaskState`: per-task lifecycle (queued, fetching, outcome, discovering, done)
//! - `DomainState`: per-domain pacing state used by the rate limiter

mod domain_state;
mod task_state;

pub use domain_state::DomainState;
pub use task_state::TaskState;
