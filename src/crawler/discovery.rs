//! Link discovery
//!
//! Discovery runs in two halves. [`LinkExtraction::from_document`] walks a
//! parsed page and collects candidate links plus contact hints; it needs no
//! crawl state. [`DiscoveryRules::filter`] then turns candidates into crawl
//! tasks and is called while the crawl context is locked, since it consults
//! the visited and enqueued sets.
//!
//! # Filtering order
//!
//! 1. Resolve relative links against the page's final URL
//! 2. Drop fragment-only, `javascript:` and `data:` links; keep `mailto:`
//!    and `tel:` only as contact hints
//! 3. Normalize (malformed links are skipped)
//! 4. Same-domain scope, unless cross-domain crawling is allowed
//! 5. Include patterns, then exclude patterns
//! 6. Already visited or enqueued (this also drops cycles)
//! 7. Depth limit

use crate::config::Config;
use crate::url::{extract_domain, normalize_parsed, DomainScope, UrlFilter};
use crate::ConfigError;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// How a crawl task's URL was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    Seed,
    /// `<a href>`
    Anchor,
    /// `<link rel="canonical">`
    Canonical,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Seed => "seed",
            Self::Anchor => "anchor",
            Self::Canonical => "canonical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContactKind {
    Email,
    Phone,
}

/// A `mailto:` or `tel:` link, kept out of the frontier but reported
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ContactHint {
    pub kind: ContactKind,
    pub value: String,
    pub source_url: String,
}

/// A resolved but not yet filtered link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    pub url: Url,
    pub method: DiscoveryMethod,
}

/// Everything link-related found on one page, in document order
#[derive(Debug, Clone, Default)]
pub struct LinkExtraction {
    pub candidates: Vec<CandidateLink>,
    pub contact_hints: Vec<ContactHint>,
}

fn link_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    SELECTOR
        .get_or_init(|| Selector::parse("a[href], link[rel='canonical'][href]").ok())
        .as_ref()
}

impl LinkExtraction {
    /// Collects candidate links and contact hints from a parsed page
    ///
    /// # Arguments
    ///
    /// * `document` - The parsed page
    /// * `base_url` - The page's final URL, used to resolve relative links
    pub fn from_document(document: &Html, base_url: &Url) -> Self {
        let mut extraction = Self::default();
        let Some(selector) = link_selector() else {
            return extraction;
        };
        let mut seen_hints: HashSet<(ContactKind, String)> = HashSet::new();

        for element in document.select(selector) {
            let el = element.value();
            let method = if el.name() == "link" {
                DiscoveryMethod::Canonical
            } else {
                DiscoveryMethod::Anchor
            };

            if method == DiscoveryMethod::Anchor && el.attr("download").is_some() {
                continue;
            }

            let Some(href) = el.attr("href") else {
                continue;
            };

            match classify_href(href, base_url) {
                Href::Crawlable(url) => extraction.candidates.push(CandidateLink { url, method }),
                Href::Contact(kind, value) => {
                    if seen_hints.insert((kind, value.clone())) {
                        extraction.contact_hints.push(ContactHint {
                            kind,
                            value,
                            source_url: base_url.to_string(),
                        });
                    }
                }
                Href::Skip => {}
            }
        }

        extraction
    }

    /// Parses HTML text and collects links (see [`LinkExtraction::from_document`])
    pub fn from_html(html: &str, base_url: &Url) -> Self {
        Self::from_document(&Html::parse_document(html), base_url)
    }
}

enum Href {
    Crawlable(Url),
    Contact(ContactKind, String),
    Skip,
}

fn classify_href(href: &str, base_url: &Url) -> Href {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return Href::Skip;
    }

    let lower = href.to_ascii_lowercase();
    if let Some(address) = lower.strip_prefix("mailto:") {
        let address = address.split('?').next().unwrap_or("").trim();
        return if address.is_empty() {
            Href::Skip
        } else {
            Href::Contact(ContactKind::Email, address.to_string())
        };
    }
    if lower.starts_with("tel:") {
        let number: String = href[4..]
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();
        return if number.is_empty() {
            Href::Skip
        } else {
            Href::Contact(ContactKind::Phone, number)
        };
    }
    if lower.starts_with("javascript:") || lower.starts_with("data:") {
        return Href::Skip;
    }

    match base_url.join(href) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Href::Crawlable(url),
        Ok(_) => Href::Skip,
        Err(e) => {
            debug!("Skipping malformed link {:?} on {}: {}", href, base_url, e);
            Href::Skip
        }
    }
}

/// A link that passed every filter, ready to become a crawl task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    /// Normalized absolute URL
    pub url: Url,
    pub domain: String,
    pub depth: u32,
    pub method: DiscoveryMethod,
}

/// Why a candidate link was not enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    OutOfScope,
    NotIncluded,
    Excluded,
    AlreadySeen,
    TooDeep,
}

/// Result of filtering one page's candidates
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub links: Vec<DiscoveredLink>,
    pub rejected: Vec<(String, Rejection)>,
}

/// Scope, pattern, and depth rules applied to candidate links
#[derive(Debug, Clone)]
pub struct DiscoveryRules {
    scope: DomainScope,
    filter: UrlFilter,
    max_depth: u32,
}

impl DiscoveryRules {
    pub fn new(scope: DomainScope, filter: UrlFilter, max_depth: u32) -> Self {
        Self {
            scope,
            filter,
            max_depth,
        }
    }

    /// Builds the rules for a crawl seeded on `seed_domains`
    pub fn from_config<I>(seed_domains: I, config: &Config) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        Ok(Self::new(
            DomainScope::new(seed_domains, &config.discovery),
            UrlFilter::from_config(&config.discovery)?,
            config.crawler.max_depth,
        ))
    }

    /// Filters candidates found on a page at `parent_depth`
    ///
    /// `is_known` reports whether a normalized URL was already visited or
    /// enqueued. Output order is first-occurrence document order.
    pub fn filter<F>(
        &self,
        candidates: &[CandidateLink],
        parent_depth: u32,
        is_known: F,
    ) -> DiscoveryOutcome
    where
        F: Fn(&str) -> bool,
    {
        let child_depth = parent_depth + 1;
        let mut outcome = DiscoveryOutcome::default();
        let mut seen_on_page: HashSet<String> = HashSet::new();

        for candidate in candidates {
            match self.check(candidate, child_depth, &is_known, &seen_on_page) {
                Ok(link) => {
                    seen_on_page.insert(link.url.to_string());
                    outcome.links.push(link);
                }
                Err(reason) => outcome.rejected.push((candidate.url.to_string(), reason)),
            }
        }

        outcome
    }

    fn check<F>(
        &self,
        candidate: &CandidateLink,
        child_depth: u32,
        is_known: &F,
        seen_on_page: &HashSet<String>,
    ) -> Result<DiscoveredLink, Rejection>
    where
        F: Fn(&str) -> bool,
    {
        let url = normalize_parsed(candidate.url.clone()).map_err(|e| {
            debug!("Skipping {}: {}", candidate.url, e);
            Rejection::Malformed
        })?;
        let domain = extract_domain(&url).ok_or(Rejection::Malformed)?;

        if !self.scope.contains(&domain) {
            return Err(Rejection::OutOfScope);
        }

        let key = url.as_str();
        if !self.filter.is_included(key) {
            return Err(Rejection::NotIncluded);
        }
        if self.filter.is_excluded(key) {
            return Err(Rejection::Excluded);
        }

        if seen_on_page.contains(key) || is_known(key) {
            return Err(Rejection::AlreadySeen);
        }

        if child_depth > self.max_depth {
            return Err(Rejection::TooDeep);
        }

        Ok(DiscoveredLink {
            url,
            domain,
            depth: child_depth,
            method: candidate.method,
        })
    }
}

/// One-shot discovery over raw page content
///
/// Parses `content`, resolves links against `base_url`, and filters them
/// against the given visited and enqueued sets.
pub fn discover_links(
    content: &str,
    base_url: &Url,
    depth: u32,
    visited: &HashSet<String>,
    enqueued: &HashSet<String>,
    rules: &DiscoveryRules,
) -> (Vec<DiscoveredLink>, Vec<ContactHint>) {
    let extraction = LinkExtraction::from_html(content, base_url);
    let outcome = rules.filter(&extraction.candidates, depth, |url| {
        visited.contains(url) || enqueued.contains(url)
    });
    (outcome.links, extraction.contact_hints)
}
