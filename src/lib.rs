//! Sumi-Harvest: an entity harvester built on a polite crawler
//!
//! This crate crawls a site from one or more seed URLs that belong to a single
//! logical entity (a business, an organization), runs several independent
//! extraction strategies over every fetched page, and aggregates the partial
//! per-page records into one entity record with provenance and a page graph.

pub mod aggregate;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod robots;
pub mod state;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("No seed URLs were supplied")]
    NoSeeds,

    #[error("None of the {attempted} seed URLs could be fetched")]
    NoReachableSeed { attempted: usize },

    #[error("Global crawl deadline reached while waiting to request {domain}")]
    RateLimitTimeout { domain: String },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::TaskState,
        to: state::TaskState,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Crawl worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
///
/// During link discovery these are the "malformed link" errors: the link is
/// skipped and the crawl carries on.
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Failures reported by a [`crawler::PageFetcher`]
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Http {
        url: String,
        status: u16,
        /// Server-provided "retry later" hint (e.g. `Retry-After`)
        retry_after: Option<Duration>,
    },

    #[error("Expected HTML from {url}, got {content_type}")]
    ContentMismatch { url: String, content_type: String },

    #[error("Empty response body from {url}")]
    EmptyBody { url: String },
}

impl FetchError {
    /// Returns true if this failure should mark the page as TIMEOUT rather than FAILED
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the explicit retry hint carried by this failure, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised by a single extraction strategy on a single page
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("Malformed JSON-LD: {0}")]
    MalformedJson(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Extraction failed: {0}")]
    Invalid(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use aggregate::EntityAggregate;
pub use config::{Config, CrawlPlan};
pub use crawler::{cancel, start_crawl, start_crawl_with_strategies, CrawlHandle, PageFetcher};
pub use state::{DomainState, TaskState};
pub use url::{extract_domain, normalize_url};
