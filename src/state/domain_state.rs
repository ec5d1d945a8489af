use std::time::Duration;
use tokio::time::Instant;

/// Tracks the pacing state of one domain during crawling
///
/// All times are `tokio::time::Instant` so the limiter sleeps on the same
/// clock it computes slots with.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Number of request slots handed out for this domain
    pub request_count: u32,

    /// Start time of the most recently reserved slot
    pub last_request_time: Option<Instant>,

    /// Minimum interval between requests (configured rate or robots.txt Crawl-delay)
    pub base_interval: Duration,

    /// Current interval, raised by backoff and decayed by successes
    pub current_interval: Duration,

    /// Successful fetches since the last failure or decay step
    pub consecutive_successes: u32,

    /// Server-requested earliest time for the next request
    pub retry_not_before: Option<Instant>,
}

impl DomainState {
    pub fn new(base_interval: Duration) -> Self {
        Self {
            request_count: 0,
            last_request_time: None,
            base_interval,
            current_interval: base_interval,
            consecutive_successes: 0,
            retry_not_before: None,
        }
    }

    /// Computes the earliest start time for the next request
    ///
    /// A pending retry hint replaces the backed-off interval, but the base
    /// interval since the previous request is always kept.
    pub fn next_slot(&self, now: Instant) -> Instant {
        let Some(last) = self.last_request_time else {
            return self.retry_not_before.map_or(now, |retry| retry.max(now));
        };

        let floor = last + self.base_interval;
        let computed = match self.retry_not_before {
            Some(retry) => retry.max(floor),
            None => last + self.current_interval,
        };

        computed.max(now)
    }

    /// Reserves the next slot and records it as this domain's latest request
    pub fn reserve(&mut self, now: Instant) -> Instant {
        let slot = self.next_slot(now);
        self.request_count += 1;
        self.last_request_time = Some(slot);
        self.retry_not_before = None;
        slot
    }

    /// Returns how long a request made at `now` would have to wait
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let slot = self.next_slot(now);
        (slot > now).then(|| slot - now)
    }

    /// Doubles the interval (capped) and applies an optional retry hint
    pub fn record_failure(
        &mut self,
        max_interval: Duration,
        retry_after: Option<Duration>,
        now: Instant,
    ) {
        self.consecutive_successes = 0;
        self.current_interval = (self.current_interval * 2)
            .min(max_interval)
            .max(self.base_interval);

        if let Some(delay) = retry_after {
            self.retry_not_before = Some(now + delay);
        }
    }

    /// Holds the next request back until at least `now + delay`
    ///
    /// Unlike a failure this leaves the interval alone; an earlier pending
    /// hint that reaches further is kept.
    pub fn defer(&mut self, delay: Duration, now: Instant) {
        let until = now + delay;
        self.retry_not_before = Some(self.retry_not_before.map_or(until, |t| t.max(until)));
    }

    /// Counts a success and halves a backed-off interval after `threshold` in a row
    pub fn record_success(&mut self, threshold: u32) {
        self.consecutive_successes += 1;

        if self.is_backed_off() && self.consecutive_successes >= threshold {
            self.current_interval = (self.current_interval / 2).max(self.base_interval);
            self.consecutive_successes = 0;
        }
    }

    /// Raises the base interval (never lowers it)
    pub fn raise_base_interval(&mut self, interval: Duration) {
        if interval > self.base_interval {
            self.base_interval = interval;
            self.current_interval = self.current_interval.max(interval);
        }
    }

    pub fn is_backed_off(&self) -> bool {
        self.current_interval > self.base_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(1000);
    const CAP: Duration = Duration::from_millis(8000);

    #[test]
    fn test_first_request_is_immediate() {
        let state = DomainState::new(BASE);
        let now = Instant::now();
        assert_eq!(state.next_slot(now), now);
        assert!(state.time_until_next_request(now).is_none());
    }

    #[test]
    fn test_reserve_spaces_requests_by_base_interval() {
        let mut state = DomainState::new(BASE);
        let now = Instant::now();

        let first = state.reserve(now);
        let second = state.reserve(now);
        let third = state.reserve(now);

        assert_eq!(second - first, BASE);
        assert_eq!(third - second, BASE);
        assert_eq!(state.request_count, 3);
    }

    #[test]
    fn test_time_until_next_request() {
        let mut state = DomainState::new(BASE);
        let now = Instant::now();
        state.reserve(now);

        let soon = now + Duration::from_millis(400);
        assert_eq!(
            state.time_until_next_request(soon),
            Some(Duration::from_millis(600))
        );
        assert!(state
            .time_until_next_request(now + Duration::from_millis(1100))
            .is_none());
    }

    #[test]
    fn test_failure_doubles_until_cap() {
        let mut state = DomainState::new(BASE);
        let now = Instant::now();

        for expected in [2000, 4000, 8000, 8000] {
            state.record_failure(CAP, None, now);
            assert_eq!(state.current_interval, Duration::from_millis(expected));
        }
        assert!(state.is_backed_off());
    }

    #[test]
    fn test_successes_decay_toward_base() {
        let mut state = DomainState::new(BASE);
        let now = Instant::now();
        state.record_failure(CAP, None, now);
        state.record_failure(CAP, None, now);
        assert_eq!(state.current_interval, Duration::from_millis(4000));

        state.record_success(3);
        state.record_success(3);
        assert_eq!(state.current_interval, Duration::from_millis(4000));
        state.record_success(3);
        assert_eq!(state.current_interval, Duration::from_millis(2000));

        for _ in 0..3 {
            state.record_success(3);
        }
        assert_eq!(state.current_interval, BASE);

        for _ in 0..3 {
            state.record_success(3);
        }
        assert_eq!(state.current_interval, BASE);
    }

    #[test]
    fn test_failure_resets_success_streak() {
        let mut state = DomainState::new(BASE);
        let now = Instant::now();
        state.record_failure(CAP, None, now);
        state.record_success(2);
        state.record_failure(CAP, None, now);
        assert_eq!(state.consecutive_successes, 0);
        assert_eq!(state.current_interval, Duration::from_millis(4000));
    }

    #[test]
    fn test_retry_hint_overrides_backoff() {
        let mut state = DomainState::new(BASE);
        let now = Instant::now();
        state.reserve(now);

        // Backoff alone would push the next slot to now + 8s
        state.record_failure(CAP, None, now);
        state.record_failure(CAP, None, now);
        state.record_failure(CAP, Some(Duration::from_millis(1500)), now);

        assert_eq!(state.next_slot(now), now + Duration::from_millis(1500));
    }

    #[test]
    fn test_retry_hint_never_undercuts_base_interval() {
        let mut state = DomainState::new(BASE);
        let now = Instant::now();
        state.reserve(now);
        state.record_failure(CAP, Some(Duration::from_millis(100)), now);

        assert_eq!(state.next_slot(now), now + BASE);
    }

    #[test]
    fn test_retry_hint_is_consumed_by_reserve() {
        let mut state = DomainState::new(BASE);
        let now = Instant::now();
        state.record_failure(CAP, Some(Duration::from_millis(3000)), now);

        let slot = state.reserve(now);
        assert_eq!(slot, now + Duration::from_millis(3000));
        assert!(state.retry_not_before.is_none());
    }

    #[test]
    fn test_defer_keeps_interval_and_later_hint() {
        let now = Instant::now();
        let mut state = DomainState::new(Duration::from_millis(100));
        state.defer(Duration::from_secs(2), now);
        state.defer(Duration::from_millis(500), now);

        assert_eq!(state.current_interval, Duration::from_millis(100));
        assert_eq!(state.next_slot(now), now + Duration::from_secs(2));
    }

    #[test]
    fn test_raise_base_interval() {
        let mut state = DomainState::new(BASE);
        state.raise_base_interval(Duration::from_secs(5));
        assert_eq!(state.base_interval, Duration::from_secs(5));
        assert_eq!(state.current_interval, Duration::from_secs(5));

        state.raise_base_interval(Duration::from_secs(1));
        assert_eq!(state.base_interval, Duration::from_secs(5));
    }
}
