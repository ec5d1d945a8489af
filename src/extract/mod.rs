//! Extraction strategies and the per-page result merger
//!
//! Every fetched page is offered to an ordered list of independent
//! [`ExtractionStrategy`] implementations. Each returns at most one
//! confidence-scored [`ExtractedRecord`]; [`merger::merge_page`] folds them
//! into one [`merger::MergedPageRecord`].
//!
//! Built-in strategies, strongest first:
//!
//! | Strategy        | Source                         | Confidence | Priority |
//! |-----------------|--------------------------------|------------|----------|
//! | structured-data | JSON-LD `<script>` blocks      | 0.9        | 3        |
//! | microdata       | schema.org `itemscope` markup  | 0.8        | 2        |
//! | heuristic       | meta tags, title, contact text | 0.5        | 1        |

pub mod heuristic;
pub mod merger;
pub mod microdata;
pub mod structured;

use crate::ExtractionError;
use scraper::Html;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub use heuristic::HeuristicStrategy;
pub use merger::{
    compare_claims, merge_page, ExtractionStatus, FieldConflict, MergedField, MergedPageRecord,
    PageMeta,
};
pub use microdata::MicrodataStrategy;
pub use structured::StructuredDataStrategy;

/// Canonical field names shared by the built-in strategies
pub mod fields {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const TELEPHONE: &str = "telephone";
    pub const EMAIL: &str = "email";
    pub const URL: &str = "url";
    pub const LOGO: &str = "logo";
    pub const ADDRESS: &str = "address";
    pub const STREET_ADDRESS: &str = "street_address";
    pub const LOCALITY: &str = "locality";
    pub const REGION: &str = "region";
    pub const POSTAL_CODE: &str = "postal_code";
    pub const COUNTRY: &str = "country";
    pub const SAME_AS: &str = "same_as";
    pub const FOUNDING_DATE: &str = "founding_date";
}

/// Identity of a strategy; `priority` breaks exact confidence ties (higher wins)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StrategyId {
    pub name: &'static str,
    pub priority: u8,
}

impl StrategyId {
    pub const STRUCTURED_DATA: StrategyId = StrategyId {
        name: "structured-data",
        priority: 3,
    };
    pub const MICRODATA: StrategyId = StrategyId {
        name: "microdata",
        priority: 2,
    };
    pub const HEURISTIC: StrategyId = StrategyId {
        name: "heuristic",
        priority: 1,
    };
}

/// One strategy's partial record for one page
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    pub strategy: StrategyId,
    pub fields: BTreeMap<String, String>,
    /// Clamped to [0, 1]
    pub confidence: f64,
    pub source_url: String,
}

impl ExtractedRecord {
    pub fn new(strategy: StrategyId, confidence: f64, source_url: impl Into<String>) -> Self {
        Self {
            strategy,
            fields: BTreeMap::new(),
            confidence: clamp_confidence(confidence),
            source_url: source_url.into(),
        }
    }

    /// Sets a field; blank values are ignored and whitespace is collapsed
    pub fn insert(&mut self, field: &str, value: &str) {
        let value = collapse_whitespace(value);
        if !value.is_empty() {
            self.fields.insert(field.to_string(), value);
        }
    }

    /// Sets a field only if it is not already populated
    pub fn insert_if_absent(&mut self, field: &str, value: &str) {
        if !self.fields.contains_key(field) {
            self.insert(field, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns `Some(self)` when at least one field was extracted
    pub fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }
}

/// What a strategy gets to look at
pub struct PageDocument<'a> {
    /// Final URL of the page
    pub url: &'a str,
    pub content: &'a str,
    pub html: &'a Html,
}

/// An independent per-page extractor
///
/// Implementations must not panic on bad markup; they report problems as
/// [`ExtractionError`] and the page keeps whatever the other strategies find.
pub trait ExtractionStrategy: Send + Sync {
    fn id(&self) -> StrategyId;

    /// Returns zero or one record for the page
    fn extract(&self, page: &PageDocument<'_>)
        -> Result<Option<ExtractedRecord>, ExtractionError>;
}

/// A strategy that errored on a page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub message: String,
}

/// Outputs of every strategy for one page
#[derive(Debug, Clone, Default)]
pub struct StrategyRun {
    pub records: Vec<ExtractedRecord>,
    pub failures: Vec<StrategyFailure>,
}

/// The built-in strategies, strongest first
pub fn default_strategies() -> Vec<Arc<dyn ExtractionStrategy>> {
    vec![
        Arc::new(StructuredDataStrategy),
        Arc::new(MicrodataStrategy),
        Arc::new(HeuristicStrategy),
    ]
}

/// Runs every strategy over one page
///
/// A failing strategy contributes nothing but does not stop the others.
pub fn run_strategies(
    strategies: &[Arc<dyn ExtractionStrategy>],
    page: &PageDocument<'_>,
) -> StrategyRun {
    let mut run = StrategyRun::default();

    for strategy in strategies {
        let id = strategy.id();
        match strategy.extract(page) {
            Ok(Some(record)) if !record.is_empty() => run.records.push(record),
            Ok(_) => {}
            Err(e) => {
                debug!("Strategy {} failed on {}: {}", id.name, page.url, e);
                run.failures.push(StrategyFailure {
                    strategy: id.name,
                    message: e.to_string(),
                });
            }
        }
    }

    run
}

pub(crate) fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
