//! Crawl-wide aggregation of page records into one entity
//!
//! [`DataAggregator`] consumes [`MergedPageRecord`]s in completion order and
//! produces an [`EntityAggregate`]: a flattened field view with provenance,
//! deduplicated sub-entities, the raw page records, and the page graph.

mod aggregator;
pub mod graph;
pub mod similarity;

pub use aggregator::DataAggregator;
pub use graph::{PageGraph, PageNode, PageStatus, PageTree};
pub use similarity::{normalize_identifier, IdentifierMatcher};

use crate::crawler::{ContactHint, CrawlSummary};
use crate::extract::{FieldConflict, MergedPageRecord, StrategyId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Which page, strategy, and fetch produced a value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldProvenance {
    pub source_url: String,
    pub strategy: &'static str,
    pub confidence: f64,
    pub depth: u32,
    pub fetched_at: DateTime<Utc>,
}

/// A field value chosen across pages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedField {
    pub value: String,
    pub confidence: f64,
    pub strategy: StrategyId,
    /// The claim that won
    pub provenance: FieldProvenance,
    /// Every page that reported this same value, sorted by URL
    pub sources: Vec<FieldProvenance>,
}

/// Page records that share one normalized identifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubEntity {
    /// Normalized identifier of the first page in the group
    pub identifier: String,
    pub fields: BTreeMap<String, AggregatedField>,
    /// Contributing page URLs, sorted
    pub pages: Vec<String>,
}

impl SubEntity {
    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|f| f.value.as_str())
    }
}

/// A page that produced no record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPage {
    pub url: String,
    pub status: PageStatus,
    pub reason: String,
    pub http_status: Option<u16>,
    pub parent_url: Option<String>,
    pub depth: u32,
}

/// Everything the crawl did not turn into a page record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlManifest {
    pub failed: Vec<FailedPage>,
    /// Fetched after cancellation; result thrown away
    pub discarded: Vec<String>,
    /// Queued but never started
    pub dropped: Vec<String>,
    /// Redirected onto a page another task already covers
    pub duplicates: Vec<DuplicatePage>,
}

/// A fetch whose final URL was already claimed by another task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicatePage {
    pub url: String,
    pub final_url: String,
}

/// The harvested entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityAggregate {
    pub fields: BTreeMap<String, AggregatedField>,
    pub entities: Vec<SubEntity>,
    /// Raw per-page records, ordered by depth then URL
    pub pages: Vec<MergedPageRecord>,
    pub graph: PageGraph,
    pub conflicts: Vec<FieldConflict>,
    pub contact_hints: Vec<ContactHint>,
    pub manifest: CrawlManifest,
    pub summary: CrawlSummary,
    /// The crawl was cancelled or hit a deadline
    pub partial: bool,
}

impl EntityAggregate {
    pub fn field(&self, name: &str) -> Option<&AggregatedField> {
        self.fields.get(name)
    }

    /// Field name to winning value
    pub fn flattened(&self) -> BTreeMap<&str, &str> {
        self.fields
            .iter()
            .map(|(name, field)| (name.as_str(), field.value.as_str()))
            .collect()
    }

    pub fn page_tree(&self) -> Vec<PageTree> {
        self.graph.tree()
    }

    pub fn page(&self, url: &str) -> Option<&MergedPageRecord> {
        self.pages.iter().find(|p| p.url == url)
    }

    /// Every page URL referenced by a field's provenance
    pub fn provenance_urls(&self) -> BTreeSet<&str> {
        let entity_fields = self.entities.iter().flat_map(|e| e.fields.values());
        self.fields
            .values()
            .chain(entity_fields)
            .flat_map(|f| std::iter::once(&f.provenance).chain(f.sources.iter()))
            .map(|p| p.source_url.as_str())
            .collect()
    }
}
