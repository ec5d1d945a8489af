//! URL handling module for Sumi-Harvest
//!
//! This module provides URL normalization, domain extraction, and the
//! scope/pattern checks used by link discovery.

mod matcher;
mod normalize;

use url::Url;

pub use matcher::{matches_wildcard, DomainScope, UrlFilter};
pub use normalize::{normalize_parsed, normalize_url};

/// Extracts the lowercase host of a URL
///
/// The port is not part of the domain: every port of a host shares one
/// rate-limit slot and one robots.txt.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the robots.txt URL serving the given page
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}
