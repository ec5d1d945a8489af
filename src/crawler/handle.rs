//! Public entry points: starting a crawl and the handle it returns

use crate::aggregate::EntityAggregate;
use crate::config::{validate, Config};
use crate::crawler::context::{CrawlContext, CrawlProgress};
use crate::crawler::coordinator::Coordinator;
use crate::crawler::discovery::DiscoveryRules;
use crate::crawler::events::CrawlEvent;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::frontier::CrawlTask;
use crate::extract::{default_strategies, ExtractionStrategy};
use crate::url::{extract_domain, normalize_url};
use crate::{HarvestError, Result, UrlError};
use std::sync::Arc;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

const EVENT_CAPACITY: usize = 1024;

/// A running crawl
///
/// Dropping the handle does not stop the crawl; call [`CrawlHandle::cancel`].
pub struct CrawlHandle {
    context: Arc<CrawlContext>,
    cancel: CancellationToken,
    events: broadcast::Sender<CrawlEvent>,
    result: oneshot::Receiver<Result<EntityAggregate>>,
}

impl CrawlHandle {
    pub fn progress(&self) -> CrawlProgress {
        self.context.progress()
    }

    /// Waits for the crawl to finish or wind down after cancellation
    pub async fn result(self) -> Result<EntityAggregate> {
        self.result
            .await
            .map_err(|_| HarvestError::Worker("crawl ended without a result".to_string()))?
    }

    /// Returns the result if the crawl has finished, without waiting
    ///
    /// The result is handed out once; later calls report an error.
    pub fn try_result(&mut self) -> Option<Result<EntityAggregate>> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(HarvestError::Worker(
                "crawl result already taken or lost".to_string(),
            ))),
        }
    }

    /// Stops dequeuing; in-flight fetches finish but their results are discarded
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A token that cancels this crawl, e.g. from a signal handler
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receives events sent from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }
}

/// Cancels the crawl behind `handle`
pub fn cancel(handle: &CrawlHandle) {
    handle.cancel();
}

/// Starts a crawl with the built-in extraction strategies
///
/// Must be called from within a Tokio runtime. Configuration and seed
/// problems are reported here; everything else comes from
/// [`CrawlHandle::result`].
pub fn start_crawl<I, S>(
    seed_urls: I,
    config: Config,
    fetcher: Arc<dyn PageFetcher>,
) -> Result<CrawlHandle>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    start_crawl_with_strategies(seed_urls, config, fetcher, default_strategies())
}

/// Starts a crawl with a caller-chosen, ordered list of strategies
pub fn start_crawl_with_strategies<I, S>(
    seed_urls: I,
    config: Config,
    fetcher: Arc<dyn PageFetcher>,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
) -> Result<CrawlHandle>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    validate(&config)?;

    let mut seeds = Vec::new();
    for seed in seed_urls {
        let url = normalize_url(seed.as_ref())?;
        let domain = extract_domain(&url).ok_or(UrlError::MissingDomain)?;
        seeds.push(CrawlTask::seed(url, domain));
    }
    if seeds.is_empty() {
        return Err(HarvestError::NoSeeds);
    }

    let seed_domains: Vec<String> = seeds.iter().map(|s| s.domain.clone()).collect();
    let rules = DiscoveryRules::from_config(seed_domains, &config)?;
    let context = Arc::new(CrawlContext::new(
        rules,
        config.crawler.traversal_order,
        config.crawler.max_pages,
    ));
    let seeded = context.seed(seeds);
    info!("Seeded crawl with {} URLs", seeded);

    let cancel = CancellationToken::new();
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (tx, rx) = oneshot::channel();

    let coordinator = Coordinator::new(
        &config,
        Arc::clone(&context),
        fetcher,
        strategies,
        events.clone(),
        cancel.clone(),
    );
    tokio::spawn(async move {
        // The handle may have been dropped; the result is then unwanted
        let _ = tx.send(coordinator.run().await);
    });

    Ok(CrawlHandle {
        context,
        cancel,
        events,
        result: rx,
    })
}
