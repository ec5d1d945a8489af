use crate::config::DiscoveryConfig;
use crate::ConfigError;
use regex::Regex;
use std::collections::BTreeSet;

/// Checks if a domain matches a wildcard pattern
///
/// `"example.com"` matches only itself. `"*.example.com"` matches the bare
/// domain and any subdomain at any depth.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Decides whether a link's domain belongs to the harvested entity
#[derive(Debug, Clone)]
pub struct DomainScope {
    seed_domains: BTreeSet<String>,
    allowed_patterns: Vec<String>,
    allow_cross_domain: bool,
}

impl DomainScope {
    /// Builds the scope from the seed domains and the discovery configuration
    pub fn new<I>(seed_domains: I, config: &DiscoveryConfig) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            seed_domains: seed_domains
                .into_iter()
                .map(|d| d.to_lowercase())
                .collect(),
            allowed_patterns: config
                .allowed_domains
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            allow_cross_domain: config.allow_cross_domain,
        }
    }

    /// Returns true if links to `domain` may be followed
    pub fn contains(&self, domain: &str) -> bool {
        if self.allow_cross_domain || self.seed_domains.contains(domain) {
            return true;
        }

        self.allowed_patterns
            .iter()
            .any(|pattern| matches_wildcard(pattern, domain))
    }

    pub fn seed_domains(&self) -> impl Iterator<Item = &str> {
        self.seed_domains.iter().map(String::as_str)
    }
}

/// Compiled include/exclude patterns applied to normalized URLs
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl UrlFilter {
    /// Compiles the discovery patterns
    ///
    /// # Returns
    ///
    /// * `Ok(UrlFilter)` - All patterns compiled
    /// * `Err(ConfigError::InvalidPattern)` - The first pattern that failed to compile
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            include: compile_all(&config.include_patterns)?,
            exclude: compile_all(&config.exclude_patterns)?,
        })
    }

    /// With include patterns present, at least one must match
    pub fn is_included(&self, url: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(url))
    }

    /// Any matching exclude pattern drops the URL
    pub fn is_excluded(&self, url: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(url))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                ConfigError::InvalidPattern(format!("Invalid URL pattern '{}': {}", p, e))
            })
        })
        .collect()
}
