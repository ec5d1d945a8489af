//! Shared crawl state
//!
//! The frontier, the visited and enqueued sets, and the task counters all
//! live behind one mutex. Workers only touch them through these methods and
//! never hold the lock across an await.

use crate::config::TraversalOrder;
use crate::crawler::discovery::{CandidateLink, DiscoveryRules};
use crate::crawler::events::TerminationReason;
use crate::crawler::frontier::{CrawlTask, Frontier};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Poll interval for idle workers; a missed wakeup costs at most this much
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Point-in-time crawl counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlProgress {
    pub completed: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub discovered_total: usize,
}

/// What a worker should do next
#[derive(Debug)]
pub enum NextTask {
    Task(CrawlTask),
    /// Frontier is empty but in-flight pages may still discover more
    Wait,
    Finished,
}

#[derive(Debug)]
struct Inner {
    frontier: Frontier,
    /// Dequeued URLs, plus final URLs of redirected fetches
    visited: HashSet<String>,
    /// Every URL ever enqueued
    enqueued: HashSet<String>,
    in_flight: usize,
    started: usize,
    completed: usize,
    discovered_total: usize,
    dropped: Vec<String>,
    stopped: Option<TerminationReason>,
}

/// Frontier and bookkeeping for one crawl
#[derive(Debug)]
pub struct CrawlContext {
    inner: Mutex<Inner>,
    rules: DiscoveryRules,
    max_pages: usize,
    notify: Notify,
}

impl CrawlContext {
    pub fn new(rules: DiscoveryRules, order: TraversalOrder, max_pages: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                frontier: Frontier::new(order),
                visited: HashSet::new(),
                enqueued: HashSet::new(),
                in_flight: 0,
                started: 0,
                completed: 0,
                discovered_total: 0,
                dropped: Vec::new(),
                stopped: None,
            }),
            rules,
            max_pages,
            notify: Notify::new(),
        }
    }

    /// Enqueues seed tasks, skipping duplicates
    ///
    /// Returns the number of seeds enqueued.
    pub fn seed(&self, seeds: Vec<CrawlTask>) -> usize {
        let mut inner = self.lock();
        let mut batch = Vec::with_capacity(seeds.len());
        for task in seeds {
            if inner.enqueued.insert(task.url.to_string()) {
                batch.push(task);
            }
        }
        let count = batch.len();
        inner.frontier.push_batch(batch);
        count
    }

    /// Dequeues the next task, if one may be started
    pub fn next_task(&self) -> NextTask {
        let mut inner = self.lock();

        if inner.stopped.is_some() || inner.started >= self.max_pages {
            return NextTask::Finished;
        }

        while let Some(task) = inner.frontier.pop() {
            // A redirect already landed here
            if !inner.visited.insert(task.url.to_string()) {
                debug!("Skipping {}: already fetched via a redirect", task.url);
                continue;
            }
            inner.in_flight += 1;
            inner.started += 1;
            return NextTask::Task(task);
        }

        if inner.in_flight == 0 {
            NextTask::Finished
        } else {
            NextTask::Wait
        }
    }

    /// Parks an idle worker until work may be available
    pub async fn wait_for_work(&self) {
        let _ = tokio::time::timeout(IDLE_POLL, self.notify.notified()).await;
    }

    /// Filters links found on `parent`'s page and enqueues the survivors
    ///
    /// Returns the number of new tasks; nothing is enqueued once stopped.
    pub fn enqueue_children(&self, parent: &CrawlTask, candidates: &[CandidateLink]) -> usize {
        let mut inner = self.lock();
        if inner.stopped.is_some() {
            return 0;
        }

        let outcome = self.rules.filter(candidates, parent.depth, |url| {
            inner.visited.contains(url) || inner.enqueued.contains(url)
        });
        for (url, reason) in &outcome.rejected {
            debug!("Not following {}: {:?}", url, reason);
        }

        let batch: Vec<CrawlTask> = outcome
            .links
            .into_iter()
            .map(|link| CrawlTask::from_link(link, &parent.url))
            .collect();
        for task in &batch {
            inner.enqueued.insert(task.url.to_string());
        }

        let count = batch.len();
        inner.discovered_total += count;
        inner.frontier.push_batch(batch);
        drop(inner);

        if count > 0 {
            self.notify.notify_waiters();
        }
        count
    }

    /// Claims the normalized URL a fetch for `task_url` landed on
    ///
    /// Returns false when another task already fetched or claimed
    /// `final_url`; the caller then drops its page as a duplicate. A claimed
    /// URL still in the frontier is skipped when dequeued.
    pub fn claim_final_url(&self, task_url: &str, final_url: &str) -> bool {
        if task_url == final_url {
            return true;
        }

        let mut inner = self.lock();
        if !inner.visited.insert(final_url.to_string()) {
            return false;
        }
        inner.enqueued.insert(final_url.to_string());
        true
    }

    /// Marks one dequeued task as finished
    pub fn complete(&self) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.completed += 1;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Records a dequeued task that was never fetched
    pub fn record_dropped(&self, url: impl Into<String>) {
        self.lock().dropped.push(url.into());
    }

    /// Stops dequeuing and drops every queued task
    ///
    /// Only the first reason sticks. Returns true if this call stopped the crawl.
    pub fn stop(&self, reason: TerminationReason) -> bool {
        let mut inner = self.lock();
        if inner.stopped.is_some() {
            return false;
        }

        inner.stopped = Some(reason);
        let drained: Vec<String> = inner
            .frontier
            .drain()
            .into_iter()
            .map(|t| t.url.to_string())
            .collect();
        debug!("Crawl stopped ({}), dropping {} queued tasks", reason, drained.len());
        inner.dropped.extend(drained);
        drop(inner);

        self.notify.notify_waiters();
        true
    }

    /// Final stop reason plus every task that was never fetched
    ///
    /// Tasks still queued (only possible after the page limit) are moved to
    /// the dropped list.
    pub fn finish(&self) -> (Option<TerminationReason>, Vec<String>) {
        let mut inner = self.lock();
        let remaining: Vec<String> = inner
            .frontier
            .drain()
            .into_iter()
            .map(|t| t.url.to_string())
            .collect();
        inner.dropped.extend(remaining);
        (inner.stopped, inner.dropped.clone())
    }

    pub fn progress(&self) -> CrawlProgress {
        let inner = self.lock();
        CrawlProgress {
            completed: inner.completed,
            queued: inner.frontier.len(),
            in_flight: inner.in_flight,
            discovered_total: inner.discovered_total,
        }
    }

    pub fn pages_started(&self) -> usize {
        self.lock().started
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::crawler::discovery::LinkExtraction;
    use crate::url::{DomainScope, UrlFilter};
    use url::Url;

    fn create_test_context(max_depth: u32, max_pages: usize) -> CrawlContext {
        let discovery = DiscoveryConfig::default();
        let rules = DiscoveryRules::new(
            DomainScope::new(vec!["example.com".to_string()], &discovery),
            UrlFilter::from_config(&discovery).unwrap(),
            max_depth,
        );
        CrawlContext::new(rules, TraversalOrder::BreadthFirst, max_pages)
    }

    fn seed(path: &str) -> CrawlTask {
        CrawlTask::seed(
            Url::parse(&format!("https://example.com{}", path)).unwrap(),
            "example.com".to_string(),
        )
    }

    fn links(html: &str) -> Vec<CandidateLink> {
        LinkExtraction::from_html(html, &Url::parse("https://example.com/").unwrap()).candidates
    }

    fn expect_task(context: &CrawlContext) -> CrawlTask {
        match context.next_task() {
            NextTask::Task(task) => task,
            other => panic!("expected a task, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_seeds_are_enqueued_once() {
        let context = create_test_context(2, 10);
        assert_eq!(context.seed(vec![seed("/"), seed("/")]), 1);
        assert_eq!(context.progress().queued, 1);
    }

    #[test]
    fn test_wait_while_in_flight_then_finish() {
        let context = create_test_context(2, 10);
        context.seed(vec![seed("/")]);

        let root = expect_task(&context);
        assert!(matches!(context.next_task(), NextTask::Wait));

        context.enqueue_children(&root, &links(r#"<a href="/a">A</a>"#));
        context.complete();

        let child = expect_task(&context);
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_url.as_deref(), Some("https://example.com/"));
        context.complete();

        assert!(matches!(context.next_task(), NextTask::Finished));
        assert_eq!(context.progress().completed, 2);
    }

    #[test]
    fn test_links_back_to_visited_pages_are_dropped() {
        let context = create_test_context(3, 10);
        context.seed(vec![seed("/")]);
        let root = expect_task(&context);

        let found =
            context.enqueue_children(&root, &links(r#"<a href="/">Home</a><a href="/a">A</a>"#));
        assert_eq!(found, 1);

        let found = context.enqueue_children(&root, &links(r#"<a href="/a">A</a>"#));
        assert_eq!(found, 0);
        assert_eq!(context.progress().discovered_total, 1);
    }

    #[test]
    fn test_page_limit_stops_dequeuing() {
        let context = create_test_context(2, 1);
        context.seed(vec![seed("/"), seed("/other")]);

        expect_task(&context);
        assert!(matches!(context.next_task(), NextTask::Finished));

        context.complete();
        let (stopped, dropped) = context.finish();
        assert_eq!(stopped, None);
        assert_eq!(dropped, vec!["https://example.com/other"]);
    }

    #[test]
    fn test_redirect_targets_are_claimed_once() {
        let context = create_test_context(2, 10);
        context.seed(vec![seed("/a"), seed("/b"), seed("/c")]);

        // /a redirects onto /b while /b is still queued
        let a = expect_task(&context);
        assert!(context.claim_final_url(a.url.as_str(), "https://example.com/b"));

        // /b is skipped; /c redirects onto /a, which was already fetched
        let c = expect_task(&context);
        assert_eq!(c.url.as_str(), "https://example.com/c");
        assert!(!context.claim_final_url(c.url.as_str(), "https://example.com/a"));
        assert!(context.claim_final_url(c.url.as_str(), c.url.as_str()));

        context.complete();
        context.complete();
        assert!(matches!(context.next_task(), NextTask::Finished));
        assert_eq!(context.pages_started(), 2);
    }

    #[test]
    fn test_stop_drops_queue_and_blocks_enqueue() {
        let context = create_test_context(2, 10);
        context.seed(vec![seed("/"), seed("/a"), seed("/b")]);
        let root = expect_task(&context);

        assert!(context.stop(TerminationReason::Cancelled));
        assert!(!context.stop(TerminationReason::GlobalTimeout));
        assert!(matches!(context.next_task(), NextTask::Finished));
        assert_eq!(context.enqueue_children(&root, &links(r#"<a href="/c">C</a>"#)), 0);

        let (stopped, dropped) = context.finish();
        assert_eq!(stopped, Some(TerminationReason::Cancelled));
        assert_eq!(dropped.len(), 2);
    }
}
