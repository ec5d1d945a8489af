//! Crawl frontier: the queue of discovered but unfetched tasks

use crate::config::TraversalOrder;
use crate::crawler::discovery::{DiscoveredLink, DiscoveryMethod};
use std::collections::VecDeque;
use url::Url;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// Normalized URL
    pub url: Url,

    /// Domain of this URL
    pub domain: String,

    /// Seeds are depth 0
    pub depth: u32,

    /// Task URL of the page that discovered this one
    pub parent_url: Option<String>,

    pub method: DiscoveryMethod,
}

impl CrawlTask {
    pub fn seed(url: Url, domain: String) -> Self {
        Self {
            url,
            domain,
            depth: 0,
            parent_url: None,
            method: DiscoveryMethod::Seed,
        }
    }

    pub fn from_link(link: DiscoveredLink, parent_url: &Url) -> Self {
        Self {
            url: link.url,
            domain: link.domain,
            depth: link.depth,
            parent_url: Some(parent_url.to_string()),
            method: link.method,
        }
    }
}

/// Ordered task queue
///
/// Breadth-first is a FIFO queue. Depth-first is a stack; each batch is
/// pushed in reverse so its first link is popped first.
#[derive(Debug)]
pub struct Frontier {
    order: TraversalOrder,
    tasks: VecDeque<CrawlTask>,
}

impl Frontier {
    pub fn new(order: TraversalOrder) -> Self {
        Self {
            order,
            tasks: VecDeque::new(),
        }
    }

    /// Adds one batch of tasks in document order
    pub fn push_batch(&mut self, batch: Vec<CrawlTask>) {
        match self.order {
            TraversalOrder::BreadthFirst => self.tasks.extend(batch),
            TraversalOrder::DepthFirst => self.tasks.extend(batch.into_iter().rev()),
        }
    }

    pub fn pop(&mut self) -> Option<CrawlTask> {
        match self.order {
            TraversalOrder::BreadthFirst => self.tasks.pop_front(),
            TraversalOrder::DepthFirst => self.tasks.pop_back(),
        }
    }

    /// Removes every queued task, in the order they would have been popped
    pub fn drain(&mut self) -> Vec<CrawlTask> {
        let mut drained = Vec::with_capacity(self.tasks.len());
        while let Some(task) = self.pop() {
            drained.push(task);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
