//! Per-page merging of strategy outputs
//!
//! Field conflicts are settled by one rule, shared with the aggregator:
//!
//! 1. Higher confidence wins, whatever the strategy
//! 2. Exactly equal confidence falls back to strategy priority
//!    (structured-data > microdata > heuristic)
//! 3. An empty value never overwrites a populated one

use crate::crawler::ContactHint;
use crate::extract::{ExtractedRecord, StrategyFailure, StrategyId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// A field value together with the claim that put it there
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedField {
    pub value: String,
    pub confidence: f64,
    pub strategy: StrategyId,
}

/// A losing value, kept for the record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    pub field: String,
    pub kept_value: String,
    pub kept_strategy: &'static str,
    pub kept_source: String,
    pub discarded_value: String,
    pub discarded_strategy: &'static str,
    pub discarded_source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionStatus {
    Extracted,
    /// Every strategy came back empty; not an error
    NoExtraction,
}

/// Where and when a page was fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub url: String,
    pub final_url: String,
    pub parent_url: Option<String>,
    pub depth: u32,
    pub fetched_at: DateTime<Utc>,
    pub status_code: Option<u16>,
}

/// One page's fields after conflict resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedPageRecord {
    pub url: String,
    pub final_url: String,
    pub parent_url: Option<String>,
    pub depth: u32,
    pub fetched_at: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub fields: BTreeMap<String, MergedField>,
    pub status: ExtractionStatus,
    pub strategy_failures: Vec<StrategyFailure>,
    pub conflicts: Vec<FieldConflict>,
    pub contact_hints: Vec<ContactHint>,
}

impl MergedPageRecord {
    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|f| f.value.as_str())
    }

    pub fn has_data(&self) -> bool {
        self.status == ExtractionStatus::Extracted
    }
}

/// Compares two claims on one field by confidence, then strategy priority
///
/// `Ordering::Greater` means `a` should win. `Equal` is a full tie that the
/// caller has to break by other means.
pub fn compare_claims(
    a_confidence: f64,
    a_strategy: StrategyId,
    b_confidence: f64,
    b_strategy: StrategyId,
) -> Ordering {
    a_confidence
        .partial_cmp(&b_confidence)
        .unwrap_or(Ordering::Equal)
        .then(a_strategy.priority.cmp(&b_strategy.priority))
}

/// Folds every strategy record for one page into a single record
///
/// # Arguments
///
/// * `records` - Strategy outputs for the page, in any order
/// * `failures` - Strategies that errored on the page
/// * `meta` - Fetch metadata copied onto the record
pub fn merge_page(
    records: Vec<ExtractedRecord>,
    failures: Vec<StrategyFailure>,
    meta: PageMeta,
) -> MergedPageRecord {
    let mut fields: BTreeMap<String, MergedField> = BTreeMap::new();
    let mut conflicts = Vec::new();

    for record in records {
        for (field, value) in record.fields {
            if value.trim().is_empty() {
                continue;
            }

            let candidate = MergedField {
                value,
                confidence: record.confidence,
                strategy: record.strategy,
            };

            let Some(current) = fields.get_mut(&field) else {
                fields.insert(field, candidate);
                continue;
            };

            let candidate_wins = compare_claims(
                candidate.confidence,
                candidate.strategy,
                current.confidence,
                current.strategy,
            ) == Ordering::Greater;

            let (kept, discarded) = if candidate_wins {
                let previous = std::mem::replace(current, candidate);
                (current.clone(), previous)
            } else {
                (current.clone(), candidate)
            };

            if kept.value != discarded.value {
                debug!(
                    "Conflict on {} for {}: kept {} ({}), dropped {} ({})",
                    meta.final_url,
                    field,
                    kept.value,
                    kept.strategy.name,
                    discarded.value,
                    discarded.strategy.name
                );
                conflicts.push(FieldConflict {
                    field,
                    kept_value: kept.value,
                    kept_strategy: kept.strategy.name,
                    kept_source: meta.final_url.clone(),
                    discarded_value: discarded.value,
                    discarded_strategy: discarded.strategy.name,
                    discarded_source: meta.final_url.clone(),
                });
            }
        }
    }

    let status = if fields.is_empty() {
        ExtractionStatus::NoExtraction
    } else {
        ExtractionStatus::Extracted
    };

    MergedPageRecord {
        url: meta.url,
        final_url: meta.final_url,
        parent_url: meta.parent_url,
        depth: meta.depth,
        fetched_at: meta.fetched_at,
        status_code: meta.status_code,
        fields,
        status,
        strategy_failures: failures,
        conflicts,
        contact_hints: Vec::new(),
    }
}
