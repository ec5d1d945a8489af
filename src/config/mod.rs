//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML crawl plans.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_plan;
//! use std::path::Path;
//!
//! let plan = load_plan(Path::new("harvest.toml")).unwrap();
//! println!("Harvest will use max depth: {}", plan.config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AggregationConfig, Config, CrawlPlan, CrawlerConfig, DiscoveryConfig, RateLimitConfig,
    SimilarityAlgorithm, TraversalOrder, UserAgentConfig,
};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_plan, load_plan_with_hash, parse_plan};
pub use validation::{validate, validate_plan, validate_seeds};
