use crate::config::types::{
    AggregationConfig, Config, CrawlPlan, CrawlerConfig, DiscoveryConfig, RateLimitConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Validates a crawl plan: seeds plus the configuration
pub fn validate_plan(plan: &CrawlPlan) -> Result<(), ConfigError> {
    validate_seeds(&plan.seeds)?;
    validate(&plan.config)
}

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_discovery_config(&config.discovery)?;
    validate_aggregation_config(&config.aggregation)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates seed URLs: at least one, all http(s)
pub fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.per_fetch_timeout_s < 1 {
        return Err(ConfigError::Validation(
            "per_fetch_timeout_s must be >= 1".to_string(),
        ));
    }

    if config.global_timeout_s == Some(0) {
        return Err(ConfigError::Validation(
            "global_timeout_s must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.max_backoff_ms < config.per_domain_rate_ms {
        return Err(ConfigError::Validation(format!(
            "max_backoff_ms ({}) must be >= per_domain_rate_ms ({})",
            config.max_backoff_ms, config.per_domain_rate_ms
        )));
    }

    if config.success_decay_threshold < 1 {
        return Err(ConfigError::Validation(
            "success_decay_threshold must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    for pattern in config
        .include_patterns
        .iter()
        .chain(config.exclude_patterns.iter())
    {
        Regex::new(pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("Invalid URL pattern '{}': {}", pattern, e))
        })?;
    }

    for domain in &config.allowed_domains {
        validate_domain_pattern(domain)?;
    }

    Ok(())
}

fn validate_aggregation_config(config: &AggregationConfig) -> Result<(), ConfigError> {
    if config.identifier_field.trim().is_empty() {
        return Err(ConfigError::Validation(
            "identifier_field cannot be empty".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.similarity_threshold) {
        return Err(ConfigError::Validation(format!(
            "similarity_threshold must be within [0, 1], got {}",
            config.similarity_threshold
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
