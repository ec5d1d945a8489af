//! Per-crawl robots.txt cache
//!
//! Each domain's robots.txt is fetched at most once per crawl, through the
//! same [`PageFetcher`] that fetches pages. Domains resolve independently:
//! a slow robots.txt only holds up workers headed for that domain.

use crate::crawler::PageFetcher;
use crate::robots::ParsedRobots;
use crate::url::{extract_domain, robots_url};
use crate::FetchError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

/// Robots.txt rules for a domain and when they were fetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub robots: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(robots: ParsedRobots) -> Self {
        Self {
            robots,
            fetched_at: Utc::now(),
        }
    }
}

/// Lazily populated robots.txt cache keyed by domain
pub struct RobotsCache {
    /// Product token matched against `User-agent` lines
    agent: String,
    fetch_timeout: Duration,
    entries: Mutex<HashMap<String, Arc<OnceCell<CachedRobots>>>>,
}

impl RobotsCache {
    pub fn new(agent: impl Into<String>, fetch_timeout: Duration) -> Self {
        Self {
            agent: agent.into(),
            fetch_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Returns the rules for the URL's domain, fetching them on first use
    ///
    /// Concurrent callers for one domain share a single request. A missing,
    /// unreachable or slower-than-`fetch_timeout` robots.txt allows
    /// everything. If the calling future is dropped mid-fetch, the next
    /// caller fetches again.
    pub async fn rules_for(&self, url: &Url, fetcher: &dyn PageFetcher) -> CachedRobots {
        let Some(domain) = extract_domain(url) else {
            return CachedRobots::new(ParsedRobots::allow_all());
        };

        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(domain).or_default())
        };

        cell.get_or_init(|| async {
            let robots = match robots_url(url) {
                Some(target) => self.fetch(&target, fetcher).await,
                None => ParsedRobots::allow_all(),
            };
            CachedRobots::new(robots)
        })
        .await
        .clone()
    }

    async fn fetch(&self, target: &Url, fetcher: &dyn PageFetcher) -> ParsedRobots {
        match timeout(self.fetch_timeout, fetch_robots(target, fetcher)).await {
            Ok(robots) => robots,
            Err(_) => {
                warn!(
                    "robots.txt at {} took longer than {:?}; allowing all",
                    target, self.fetch_timeout
                );
                ParsedRobots::allow_all()
            }
        }
    }
}

async fn fetch_robots(target: &Url, fetcher: &dyn PageFetcher) -> ParsedRobots {
    match fetcher.fetch_text(target).await {
        Ok(response) => {
            debug!("Fetched {} ({})", target, response.status_code);
            response
                .content
                .as_deref()
                .map(ParsedRobots::from_content)
                .unwrap_or_default()
        }
        Err(FetchError::Http { status, .. }) if (400..500).contains(&status) => {
            debug!("No robots.txt at {} (HTTP {})", target, status);
            ParsedRobots::allow_all()
        }
        Err(e) => {
            warn!("Could not fetch {}: {}; allowing all", target, e);
            ParsedRobots::allow_all()
        }
    }
}
