use crate::config::types::CrawlPlan;
use crate::config::validation::validate_plan;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a crawl plan from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML crawl plan
///
/// # Returns
///
/// * `Ok(CrawlPlan)` - Successfully loaded and validated plan
/// * `Err(ConfigError)` - Failed to load, parse, or validate the plan
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_harvest::config::load_plan;
///
/// let plan = load_plan(Path::new("harvest.toml")).unwrap();
/// println!("Max depth: {}", plan.config.crawler.max_depth);
/// ```
pub fn load_plan(path: &Path) -> Result<CrawlPlan, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_plan(&content)
}

/// Parses and validates a crawl plan from TOML text
pub fn parse_plan(content: &str) -> Result<CrawlPlan, ConfigError> {
    let plan: CrawlPlan = toml::from_str(content)?;
    validate_plan(&plan)?;
    Ok(plan)
}

/// Computes a SHA-256 hash of the plan file content
///
/// Logged at startup so two runs can be told apart by their configuration.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a crawl plan and returns both the plan and its hash
pub fn load_plan_with_hash(path: &Path) -> Result<(CrawlPlan, String), ConfigError> {
    let plan = load_plan(path)?;
    let hash = compute_config_hash(path)?;
    Ok((plan, hash))
}
