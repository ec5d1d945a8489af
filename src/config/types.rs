use serde::Deserialize;

/// A crawl plan as written in a TOML file: seed URLs plus the crawl configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlPlan {
    /// Seed URLs, all belonging to the entity being harvested
    pub seeds: Vec<String>,

    #[serde(flatten)]
    pub config: Config,
}

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default, rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Frontier traversal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalOrder {
    /// FIFO frontier: shallow pages before deep ones
    #[default]
    BreadthFirst,
    /// Stack-ordered frontier
    DepthFirst,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of pages to fetch in one crawl
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum depth to crawl from seed URLs (seeds are depth 0)
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of concurrent crawl workers (max fetches in flight)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(rename = "traversal-order", default)]
    pub traversal_order: TraversalOrder,

    /// Whole-crawl deadline in seconds (no deadline when unset)
    #[serde(rename = "global-timeout-s", default)]
    pub global_timeout_s: Option<u64>,

    /// Timeout for a single fetch in seconds
    #[serde(rename = "per-fetch-timeout-s", default = "default_per_fetch_timeout_s")]
    pub per_fetch_timeout_s: u64,

    /// Fetch and honor robots.txt for every crawled domain
    #[serde(rename = "respect-robots-txt", default)]
    pub respect_robots_txt: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            concurrency: default_concurrency(),
            traversal_order: TraversalOrder::default(),
            global_timeout_s: None,
            per_fetch_timeout_s: default_per_fetch_timeout_s(),
            respect_robots_txt: false,
        }
    }
}

/// Per-domain pacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum time between requests to the same domain (milliseconds)
    #[serde(rename = "per-domain-rate-ms", default = "default_per_domain_rate_ms")]
    pub per_domain_rate_ms: u64,

    /// Upper bound for the backed-off interval (milliseconds)
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive successes needed before a backed-off interval decays
    #[serde(
        rename = "success-decay-threshold",
        default = "default_success_decay_threshold"
    )]
    pub success_decay_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_domain_rate_ms: default_per_domain_rate_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            success_decay_threshold: default_success_decay_threshold(),
        }
    }
}

/// Link discovery configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryConfig {
    /// Regular expressions; when non-empty a link must match at least one
    #[serde(rename = "include-patterns", default)]
    pub include_patterns: Vec<String>,

    /// Regular expressions; a link matching any of them is dropped
    #[serde(rename = "exclude-patterns", default)]
    pub exclude_patterns: Vec<String>,

    /// Follow links to domains other than the seeds' domains
    #[serde(rename = "allow-cross-domain", default)]
    pub allow_cross_domain: bool,

    /// Extra domain patterns (e.g., "*.example.com") treated as same-domain
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,
}

/// Identifier similarity algorithm used to deduplicate sub-entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityAlgorithm {
    /// Normalized identifiers must be identical
    #[default]
    Exact,
    /// 1 - (edit distance / longer length)
    Levenshtein,
    /// Jaccard index over whitespace-separated tokens
    TokenJaccard,
}

/// Aggregation (sub-entity deduplication) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Field used as the primary identifier of a sub-entity
    #[serde(rename = "identifier-field", default = "default_identifier_field")]
    pub identifier_field: String,

    #[serde(rename = "similarity-algorithm", default)]
    pub similarity_algorithm: SimilarityAlgorithm,

    /// Minimum similarity in [0, 1] for two identifiers to match
    #[serde(
        rename = "similarity-threshold",
        default = "default_similarity_threshold"
    )]
    pub similarity_threshold: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            identifier_field: default_identifier_field(),
            similarity_algorithm: SimilarityAlgorithm::default(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url", default)]
    pub contact_url: Option<String>,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, contact
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
        }
    }
}

fn default_max_pages() -> usize {
    50
}

fn default_max_depth() -> u32 {
    2
}

fn default_concurrency() -> usize {
    3
}

fn default_per_fetch_timeout_s() -> u64 {
    30
}

fn default_per_domain_rate_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_success_decay_threshold() -> u32 {
    3
}

fn default_identifier_field() -> String {
    "name".to_string()
}

fn default_similarity_threshold() -> f64 {
    1.0
}

fn default_crawler_name() -> String {
    "SumiHarvest".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
