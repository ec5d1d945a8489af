//! Crawler module for page fetching and crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - The [`PageFetcher`] boundary and its reqwest-backed default
//! - Link discovery and filtering
//! - Per-domain rate limiting
//! - The shared frontier and the worker pool that drains it
//! - Progress events and the public [`CrawlHandle`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sumi_harvest::config::Config;
//! use sumi_harvest::crawler::{start_crawl, HttpFetcher};
//!
//! # async fn run() -> sumi_harvest::Result<()> {
//! let config = Config::default();
//! let fetcher = HttpFetcher::from_config(&config.user_agent, Duration::from_secs(30))?;
//! let handle = start_crawl(["https://example.com/"], config, Arc::new(fetcher))?;
//! let entity = handle.result().await?;
//! println!("{:?}", entity.flattened());
//! # Ok(())
//! # }
//! ```

mod context;
mod coordinator;
pub mod discovery;
mod events;
mod fetcher;
mod frontier;
mod handle;
mod rate_limiter;

pub use context::{CrawlContext, CrawlProgress, NextTask};
pub use coordinator::Coordinator;
pub use discovery::{
    discover_links, CandidateLink, ContactHint, ContactKind, DiscoveredLink, DiscoveryMethod,
    DiscoveryRules, LinkExtraction,
};
pub use events::{CrawlEvent, CrawlSummary, TaskOutcome, TerminationReason};
pub use fetcher::{build_http_client, FetchResponse, HttpFetcher, PageFetcher};
pub use frontier::{CrawlTask, Frontier};
pub use handle::{cancel, start_crawl, start_crawl_with_strategies, CrawlHandle};
pub use rate_limiter::{DomainPacing, RateLimiter};
