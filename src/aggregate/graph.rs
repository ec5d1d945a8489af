//! Page relationship graph
//!
//! Every recorded page keeps an edge to the page that discovered it. A page
//! whose parent failed, timed out, or was never recorded is kept and flagged
//! orphaned.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Fetch outcome of a recorded page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageStatus {
    Success,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageNode {
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub status: PageStatus,
    pub orphaned: bool,
}

/// Nested view of the graph, rooted at seeds and orphans
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageTree {
    pub url: String,
    pub depth: u32,
    pub status: PageStatus,
    pub orphaned: bool,
    pub children: Vec<PageTree>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageGraph {
    nodes: BTreeMap<String, PageNode>,
}

impl PageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a page; a later record for the same URL replaces the earlier one
    pub fn add_page(
        &mut self,
        url: impl Into<String>,
        depth: u32,
        parent_url: Option<String>,
        status: PageStatus,
    ) {
        let url = url.into();
        self.nodes.insert(
            url.clone(),
            PageNode {
                url,
                depth,
                parent_url,
                status,
                orphaned: false,
            },
        );
    }

    /// Sets the orphan flags once every page is recorded
    pub fn finalize(&mut self) {
        let succeeded: HashSet<String> = self
            .nodes
            .values()
            .filter(|n| n.status == PageStatus::Success)
            .map(|n| n.url.clone())
            .collect();

        for node in self.nodes.values_mut() {
            node.orphaned = match &node.parent_url {
                Some(parent) => !succeeded.contains(parent),
                None => false,
            };
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, url: &str) -> Option<&PageNode> {
        self.nodes.get(url)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PageNode> {
        self.nodes.values()
    }

    /// Pages discovered by `url`, sorted by URL
    pub fn children(&self, url: &str) -> Vec<&PageNode> {
        self.nodes
            .values()
            .filter(|n| n.parent_url.as_deref() == Some(url))
            .collect()
    }

    pub fn orphans(&self) -> Vec<&PageNode> {
        self.nodes.values().filter(|n| n.orphaned).collect()
    }

    /// Seeds, plus pages whose parent is not in the graph
    pub fn roots(&self) -> Vec<&PageNode> {
        self.nodes
            .values()
            .filter(|n| match &n.parent_url {
                None => true,
                Some(parent) => !self.nodes.contains_key(parent),
            })
            .collect()
    }

    /// Builds the nested per-page tree
    pub fn tree(&self) -> Vec<PageTree> {
        let mut seen = HashSet::new();
        self.roots()
            .into_iter()
            .filter_map(|root| self.subtree(root, &mut seen))
            .collect()
    }

    fn subtree<'a>(&'a self, node: &'a PageNode, seen: &mut HashSet<&'a str>) -> Option<PageTree> {
        // Discovery never produces cycles, but a replaced record could
        if !seen.insert(node.url.as_str()) {
            return None;
        }

        let children = self
            .children(&node.url)
            .into_iter()
            .filter_map(|child| self.subtree(child, seen))
            .collect();

        Some(PageTree {
            url: node.url.clone(),
            depth: node.depth,
            status: node.status,
            orphaned: node.orphaned,
            children,
        })
    }
}
