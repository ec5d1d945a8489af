//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator runs a fixed pool of workers over one shared
//! [`CrawlContext`]. Each worker takes a task, checks robots.txt, waits for a
//! rate-limit slot, fetches, then discovers links and runs the extraction
//! strategies on the result. Page records flow over a channel to a single
//! aggregator task, so merging is sequential.
//!
//! The coordinator itself only watches the workers, the cancellation token,
//! and the global deadline.

use crate::aggregate::{DataAggregator, DuplicatePage, EntityAggregate, FailedPage, PageStatus};
use crate::config::{AggregationConfig, Config};
use crate::crawler::context::{CrawlContext, NextTask};
use crate::crawler::discovery::LinkExtraction;
use crate::crawler::events::{CrawlEvent, CrawlSummary, TaskOutcome, TerminationReason};
use crate::crawler::fetcher::{FetchResponse, PageFetcher};
use crate::crawler::frontier::CrawlTask;
use crate::crawler::rate_limiter::RateLimiter;
use crate::extract::{
    merge_page, run_strategies, ExtractionStrategy, MergedPageRecord, PageDocument, PageMeta,
    StrategyRun,
};
use crate::robots::RobotsCache;
use crate::state::TaskState;
use crate::url::normalize_parsed;
use crate::{FetchError, HarvestError};
use chrono::Utc;
use scraper::Html;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// What workers hand to the aggregator task
#[derive(Debug)]
struct PageMessage {
    outcome: TaskOutcome,
    result: PageResult,
}

#[derive(Debug)]
enum PageResult {
    Page(Box<MergedPageRecord>),
    Failure(FailedPage),
    Discarded(String),
    Duplicate(DuplicatePage),
}

/// State shared by the coordinator and every worker
struct Shared {
    context: Arc<CrawlContext>,
    fetcher: Arc<dyn PageFetcher>,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    limiter: RateLimiter,
    robots: Option<RobotsCache>,
    events: broadcast::Sender<CrawlEvent>,
    cancel: CancellationToken,
    per_fetch_timeout: Duration,
    deadline: Option<Instant>,
    seeds_succeeded: AtomicUsize,
    warnings: Mutex<Vec<String>>,
}

impl Shared {
    fn emit(&self, event: CrawlEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn warn(&self, message: String) {
        warn!("{}", message);
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    /// Stops the crawl; only the first reason is recorded
    fn stop(&self, reason: TerminationReason) {
        if self.context.stop(reason) && reason == TerminationReason::GlobalTimeout {
            self.warn("global crawl timeout reached".to_string());
        }
    }

    /// Resolves with the reason once the crawl is cancelled or out of time
    async fn interrupted(&self) -> TerminationReason {
        let deadline_reached = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => TerminationReason::Cancelled,
            _ = deadline_reached => TerminationReason::GlobalTimeout,
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    shared: Arc<Shared>,
    concurrency: usize,
    aggregation: AggregationConfig,
    seed_count: usize,
}

impl Coordinator {
    /// Creates a coordinator for one crawl
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawl configuration
    /// * `context` - Crawl context, already seeded
    /// * `fetcher` - Transport used for pages and robots.txt
    /// * `strategies` - Extraction strategies, run in order on every page
    /// * `events` - Broadcast channel for progress events
    /// * `cancel` - Token that cancels the crawl
    pub fn new(
        config: &Config,
        context: Arc<CrawlContext>,
        fetcher: Arc<dyn PageFetcher>,
        strategies: Vec<Arc<dyn ExtractionStrategy>>,
        events: broadcast::Sender<CrawlEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let deadline = config
            .crawler
            .global_timeout_s
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let per_fetch_timeout = Duration::from_secs(config.crawler.per_fetch_timeout_s);
        let robots = config.crawler.respect_robots_txt.then(|| {
            RobotsCache::new(config.user_agent.crawler_name.clone(), per_fetch_timeout)
        });

        let seed_count = context.progress().queued;

        Self {
            shared: Arc::new(Shared {
                context,
                fetcher,
                strategies,
                limiter: RateLimiter::new(&config.rate_limit).with_deadline(deadline),
                robots,
                events,
                cancel,
                per_fetch_timeout,
                deadline,
                seeds_succeeded: AtomicUsize::new(0),
                warnings: Mutex::new(Vec::new()),
            }),
            concurrency: config.crawler.concurrency.max(1),
            aggregation: config.aggregation.clone(),
            seed_count,
        }
    }

    /// Runs the crawl to completion, cancellation, or deadline
    ///
    /// # Returns
    ///
    /// * `Ok(EntityAggregate)` - The aggregate, partial if the crawl was cut short
    /// * `Err(HarvestError::NoReachableSeed)` - The crawl ran its course and no
    ///   seed could be fetched
    pub async fn run(self) -> Result<EntityAggregate, HarvestError> {
        let started = Instant::now();
        let context = Arc::clone(&self.shared.context);
        info!(
            "Starting crawl: {} seeds, {} workers",
            self.seed_count, self.concurrency
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(consume_pages(rx, self.aggregation.clone()));

        let mut workers = JoinSet::new();
        for id in 0..self.concurrency {
            let worker = Worker {
                id,
                shared: Arc::clone(&self.shared),
                pages: tx.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(tx);

        let interrupted = self.shared.interrupted();
        tokio::pin!(interrupted);
        let mut stopping = false;

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        error!("Crawl worker failed: {}", e);
                        self.shared.warn(format!("crawl worker failed: {}", e));
                    }
                    None => break,
                },
                reason = &mut interrupted, if !stopping => {
                    stopping = true;
                    info!("Crawl interrupted ({}); waiting for in-flight fetches", reason);
                    self.shared.stop(reason);
                }
            }
        }

        let (aggregator, mut summary) = consumer
            .await
            .map_err(|e| HarvestError::Worker(e.to_string()))?;

        let (stopped, dropped) = context.finish();
        let termination = match stopped {
            Some(reason) => reason,
            None if !dropped.is_empty() => TerminationReason::MaxPages,
            None => TerminationReason::Completed,
        };

        let progress = context.progress();
        summary.pages_started = context.pages_started();
        summary.discovered_total = progress.discovered_total;
        summary.dropped = dropped.len();
        summary.duration = started.elapsed();
        summary.termination = termination;
        summary.warnings = self
            .shared
            .warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        info!(
            "Crawl finished ({}): {} succeeded, {} failed, {} timed out in {:?}",
            termination, summary.succeeded, summary.failed, summary.timed_out, summary.duration
        );

        // A crawl cut short keeps whatever it has, even if no seed got through
        if self.shared.seeds_succeeded.load(Ordering::SeqCst) == 0 && !termination.is_partial() {
            self.shared.emit(CrawlEvent::CrawlComplete(summary));
            return Err(HarvestError::NoReachableSeed {
                attempted: self.seed_count,
            });
        }

        self.shared.emit(CrawlEvent::CrawlComplete(summary.clone()));
        Ok(aggregator.finish(summary, termination.is_partial(), dropped))
    }
}

/// The single consumer of page records
async fn consume_pages(
    mut rx: mpsc::UnboundedReceiver<PageMessage>,
    config: AggregationConfig,
) -> (DataAggregator, CrawlSummary) {
    let mut aggregator = DataAggregator::new(&config);
    let mut summary = CrawlSummary::default();

    while let Some(message) = rx.recv().await {
        summary.record(&message.outcome);
        match message.result {
            PageResult::Page(record) => aggregator.add_page(*record),
            PageResult::Failure(failure) => aggregator.add_failure(failure),
            PageResult::Discarded(url) => aggregator.add_discarded(url),
            PageResult::Duplicate(duplicate) => aggregator.add_duplicate(duplicate),
        }
    }

    debug!("Aggregated {} pages", aggregator.page_count());
    (aggregator, summary)
}

/// Decrements the in-flight count even if the task unwinds
struct InFlight<'a>(&'a CrawlContext);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.complete();
    }
}

struct Worker {
    id: usize,
    shared: Arc<Shared>,
    pages: mpsc::UnboundedSender<PageMessage>,
}

/// Links and strategy output for one fetched page
#[derive(Default)]
struct PageAnalysis {
    links: LinkExtraction,
    run: StrategyRun,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} started", self.id);
        loop {
            match self.shared.context.next_task() {
                NextTask::Task(task) => {
                    let _in_flight = InFlight(&self.shared.context);
                    let url = task.url.to_string();
                    if let Err(e) = self.process(task).await {
                        error!("Task for {} aborted: {}", url, e);
                    }
                }
                NextTask::Wait => self.shared.context.wait_for_work().await,
                NextTask::Finished => break,
            }
        }
        debug!("Worker {} finished", self.id);
    }

    /// Drives one task through its state machine
    async fn process(&self, task: CrawlTask) -> Result<(), HarvestError> {
        let shared = &self.shared;
        let url = task.url.to_string();
        let state = TaskState::Queued;

        shared.emit(CrawlEvent::TaskStarted {
            url: url.clone(),
            depth: task.depth,
        });
        debug!("Processing {} (depth {})", url, task.depth);

        if let Some(robots) = &shared.robots {
            let lookup = tokio::select! {
                biased;
                reason = shared.interrupted() => Err(reason),
                rules = robots.rules_for(&task.url, shared.fetcher.as_ref()) => Ok(rules),
            };
            let rules = match lookup {
                Ok(rules) => rules,
                Err(reason) => {
                    shared.stop(reason);
                    self.drop_unfetched(&url);
                    return Ok(());
                }
            };
            if let Some(delay) = rules.robots.crawl_delay(robots.agent()) {
                shared.limiter.raise_min_interval(&task.domain, delay);
            }
            if !rules.robots.is_allowed(&url, robots.agent()) {
                info!("{} disallowed by robots.txt", url);
                let state = state.transition(TaskState::Fetching)?;
                return self.fail(
                    task,
                    state,
                    "disallowed by robots.txt".to_string(),
                    None,
                    false,
                );
            }
        }

        let wait = shared.limiter.time_until_available(&task.domain);
        if !wait.is_zero() {
            debug!("{} waits {:?} for a slot on {}", url, wait, task.domain);
        }
        let acquired = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => None,
            acquired = shared.limiter.acquire(&task.domain) => Some(acquired),
        };
        match acquired {
            None => {
                shared.stop(TerminationReason::Cancelled);
                self.drop_unfetched(&url);
                return Ok(());
            }
            Some(Err(HarvestError::RateLimitTimeout { domain })) => {
                if shared.context.stop(TerminationReason::RateLimitTimeout) {
                    shared.warn(format!(
                        "next request slot for {} falls after the global deadline",
                        domain
                    ));
                }
                self.drop_unfetched(&url);
                return Ok(());
            }
            Some(Err(e)) => return Err(e),
            Some(Ok(())) => {}
        }

        let state = state.transition(TaskState::Fetching)?;
        let fetched_at = Utc::now();
        let result = match timeout(shared.per_fetch_timeout, shared.fetcher.fetch(&task.url)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout { url: url.clone() }),
        };

        if shared.cancel.is_cancelled() {
            debug!("Discarding {} fetched after cancellation", url);
            self.finish(
                url.clone(),
                TaskOutcome::Discarded,
                PageResult::Discarded(url),
            );
            return Ok(());
        }

        match result {
            Ok(response) => {
                shared.limiter.record_success(&task.domain);
                if let Some(delay) = response.retry_after {
                    shared.limiter.defer(&task.domain, delay);
                }
                self.succeed(task, state, response, fetched_at)
            }
            Err(e) => {
                if backs_off(&e) {
                    shared.limiter.record_failure(&task.domain, e.retry_after());
                }
                let http_status = match &e {
                    FetchError::Http { status, .. } => Some(*status),
                    _ => None,
                };
                warn!("Failed to fetch {}: {}", url, e);
                self.fail(task, state, e.to_string(), http_status, e.is_timeout())
            }
        }
    }

    fn succeed(
        &self,
        task: CrawlTask,
        state: TaskState,
        response: FetchResponse,
        fetched_at: chrono::DateTime<Utc>,
    ) -> Result<(), HarvestError> {
        let shared = &self.shared;
        let url = task.url.to_string();
        let state = state.transition(TaskState::Success)?;

        if task.depth == 0 {
            shared.seeds_succeeded.fetch_add(1, Ordering::SeqCst);
        }

        // Links resolve against where the fetch actually landed
        let base = Url::parse(&response.final_url).unwrap_or_else(|_| task.url.clone());
        if let Ok(final_url) = normalize_parsed(base.clone()) {
            if final_url != task.url {
                debug!("{} redirected to {}", url, final_url);
            }
            if !shared
                .context
                .claim_final_url(task.url.as_str(), final_url.as_str())
            {
                info!("{} landed on {}, which was already fetched", url, final_url);
                // Nothing to discover on a page another task covers
                state
                    .transition(TaskState::Discovering)?
                    .transition(TaskState::Done)?;
                let final_url = final_url.to_string();
                self.finish(
                    url.clone(),
                    TaskOutcome::Duplicate {
                        final_url: final_url.clone(),
                    },
                    PageResult::Duplicate(DuplicatePage { url, final_url }),
                );
                return Ok(());
            }
        }

        let state = state.transition(TaskState::Discovering)?;
        let analysis = match response.content.as_deref() {
            Some(content) => analyze(content, &base, &shared.strategies),
            None => PageAnalysis::default(),
        };

        let count = shared.context.enqueue_children(&task, &analysis.links.candidates);
        debug!("Discovered {} new pages on {}", count, url);
        shared.emit(CrawlEvent::PagesDiscovered {
            url: url.clone(),
            count,
        });

        let mut record = merge_page(
            analysis.run.records,
            analysis.run.failures,
            PageMeta {
                url: url.clone(),
                final_url: base.to_string(),
                parent_url: task.parent_url.clone(),
                depth: task.depth,
                fetched_at,
                status_code: Some(response.status_code),
            },
        );
        record.contact_hints = analysis.links.contact_hints;

        state.transition(TaskState::Done)?;
        self.finish(
            url,
            TaskOutcome::Success {
                status_code: response.status_code,
                duration: response.duration,
            },
            PageResult::Page(Box::new(record)),
        );
        Ok(())
    }

    fn fail(
        &self,
        task: CrawlTask,
        state: TaskState,
        reason: String,
        http_status: Option<u16>,
        is_timeout: bool,
    ) -> Result<(), HarvestError> {
        let (next, status, outcome) = if is_timeout {
            (TaskState::Timeout, PageStatus::Timeout, TaskOutcome::Timeout)
        } else {
            (
                TaskState::Failed,
                PageStatus::Failed,
                TaskOutcome::Failed {
                    reason: reason.clone(),
                },
            )
        };
        state.transition(next)?.transition(TaskState::Done)?;

        let url = task.url.to_string();
        let failure = FailedPage {
            url: url.clone(),
            status,
            reason,
            http_status,
            parent_url: task.parent_url,
            depth: task.depth,
        };
        self.finish(url, outcome, PageResult::Failure(failure));
        Ok(())
    }

    /// A dequeued task that was stopped before its fetch
    fn drop_unfetched(&self, url: &str) {
        debug!("Dropping {} before fetch", url);
        self.shared.context.record_dropped(url);
        self.shared.emit(CrawlEvent::TaskCompleted {
            url: url.to_string(),
            outcome: TaskOutcome::Discarded,
        });
    }

    /// Hands a fetched task's result to the aggregator and reports it
    fn finish(&self, url: String, outcome: TaskOutcome, result: PageResult) {
        let message = PageMessage {
            outcome: outcome.clone(),
            result,
        };
        if self.pages.send(message).is_err() {
            error!("Aggregator stopped before worker {} finished", self.id);
        }
        self.shared.emit(CrawlEvent::TaskCompleted { url, outcome });
    }
}

/// Failures that mean the server wants us to slow down
fn backs_off(error: &FetchError) -> bool {
    match error {
        FetchError::Network { .. } | FetchError::Timeout { .. } => true,
        FetchError::Http { status, .. } => *status == 429 || *status >= 500,
        FetchError::ContentMismatch { .. } | FetchError::EmptyBody { .. } => false,
    }
}

/// Parses a page once and runs discovery and extraction on it
///
/// `Html` is not `Send`, so this stays synchronous and the document never
/// lives across an await.
fn analyze(
    content: &str,
    base: &Url,
    strategies: &[Arc<dyn ExtractionStrategy>],
) -> PageAnalysis {
    let html = Html::parse_document(content);
    let links = LinkExtraction::from_document(&html, base);
    let page = PageDocument {
        url: base.as_str(),
        content,
        html: &html,
    };
    let run = run_strategies(strategies, &page);
    PageAnalysis { links, run }
}
