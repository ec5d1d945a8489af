//! Per-domain request pacing with exponential backoff
//!
//! Every request slot is reserved under one lock, so concurrent workers
//! targeting the same domain are handed strictly increasing start times and
//! then sleep until their slot outside the lock.

use crate::config::RateLimitConfig;
use crate::state::DomainState;
use crate::HarvestError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

/// Pacing snapshot for one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPacing {
    pub domain: String,
    pub requests: u32,
    pub base_interval: Duration,
    pub current_interval: Duration,
}

/// Per-domain rate limiter shared by all crawl workers
#[derive(Debug)]
pub struct RateLimiter {
    base_interval: Duration,
    max_interval: Duration,
    success_decay_threshold: u32,
    /// Slots starting after this instant are refused
    deadline: Option<Instant>,
    domains: Mutex<HashMap<String, DomainState>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let base_interval = Duration::from_millis(config.per_domain_rate_ms);
        Self {
            base_interval,
            max_interval: Duration::from_millis(config.max_backoff_ms).max(base_interval),
            success_decay_threshold: config.success_decay_threshold.max(1),
            deadline: None,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Refuses any slot that would start after `deadline`
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Waits until `domain` may be requested again
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The caller owns the slot and may issue its request now
    /// * `Err(HarvestError::RateLimitTimeout)` - The slot would fall after the crawl deadline
    pub async fn acquire(&self, domain: &str) -> Result<(), HarvestError> {
        let slot = self.reserve(domain)?;
        let now = Instant::now();
        if slot > now {
            trace!("Waiting {:?} for a slot on {}", slot - now, domain);
            sleep_until(slot).await;
        }
        Ok(())
    }

    /// Reserves the next slot for `domain` without waiting for it
    pub fn reserve(&self, domain: &str) -> Result<Instant, HarvestError> {
        let now = Instant::now();
        let mut domains = self.lock();
        let state = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.base_interval));

        let slot = state.next_slot(now);
        if let Some(deadline) = self.deadline {
            if slot > deadline {
                return Err(HarvestError::RateLimitTimeout {
                    domain: domain.to_string(),
                });
            }
        }

        Ok(state.reserve(now))
    }

    /// Feeds back a successful fetch
    pub fn record_success(&self, domain: &str) {
        let mut domains = self.lock();
        if let Some(state) = domains.get_mut(domain) {
            let before = state.current_interval;
            state.record_success(self.success_decay_threshold);
            if state.current_interval < before {
                debug!(
                    "Decayed interval for {} to {:?}",
                    domain, state.current_interval
                );
            }
        }
    }

    /// Feeds back a failed fetch; `retry_after` overrides the backoff delay
    pub fn record_failure(&self, domain: &str, retry_after: Option<Duration>) {
        let now = Instant::now();
        let mut domains = self.lock();
        let state = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.base_interval));

        state.record_failure(self.max_interval, retry_after, now);
        debug!(
            "Backed off {} to {:?} (retry hint: {:?})",
            domain, state.current_interval, retry_after
        );
    }

    /// Applies a retry hint sent with a successful response
    pub fn defer(&self, domain: &str, delay: Duration) {
        let now = Instant::now();
        self.lock()
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.base_interval))
            .defer(delay, now);
        debug!("Deferring next request to {} by {:?}", domain, delay);
    }

    /// Raises a domain's minimum interval, e.g. from a robots.txt Crawl-delay
    pub fn raise_min_interval(&self, domain: &str, interval: Duration) {
        let mut domains = self.lock();
        domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.base_interval))
            .raise_base_interval(interval.min(self.max_interval));
    }

    /// Time a request to `domain` would have to wait right now
    pub fn time_until_available(&self, domain: &str) -> Duration {
        self.lock()
            .get(domain)
            .and_then(|state| state.time_until_next_request(Instant::now()))
            .unwrap_or_default()
    }

    /// Current pacing of every domain seen so far, sorted by domain
    pub fn snapshot(&self) -> Vec<DomainPacing> {
        let mut pacing: Vec<DomainPacing> = self
            .lock()
            .iter()
            .map(|(domain, state)| DomainPacing {
                domain: domain.clone(),
                requests: state.request_count,
                base_interval: state.base_interval,
                current_interval: state.current_interval,
            })
            .collect();
        pacing.sort_by(|a, b| a.domain.cmp(&b.domain));
        pacing
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DomainState>> {
        // Pacing state stays consistent even if a holder panicked
        self.domains.lock().unwrap_or_else(|e| e.into_inner())
    }
}
