use crate::aggregate::{
    normalize_identifier, AggregatedField, CrawlManifest, DuplicatePage, EntityAggregate,
    FailedPage, FieldProvenance, IdentifierMatcher, PageGraph, PageStatus, SubEntity,
};
use crate::config::AggregationConfig;
use crate::crawler::{ContactHint, ContactKind, CrawlSummary};
use crate::extract::{compare_claims, FieldConflict, MergedField, MergedPageRecord};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// Winning value per field, plus every report of every value seen
///
/// `sources` is only filled in by [`FieldTable::finish`], from all reports
/// of the final value, so a value that lost the lead and regained it keeps
/// every page that reported it.
#[derive(Default)]
struct FieldTable {
    fields: BTreeMap<String, AggregatedField>,
    /// field -> value -> pages that reported it
    reports: BTreeMap<String, BTreeMap<String, Vec<FieldProvenance>>>,
}

impl FieldTable {
    fn merge_page(&mut self, page: &MergedPageRecord) {
        for (name, claim) in &page.fields {
            self.merge_claim(name, claim, page);
        }
    }

    fn merge_claim(&mut self, name: &str, claim: &MergedField, page: &MergedPageRecord) {
        if claim.value.trim().is_empty() {
            return;
        }

        let provenance = FieldProvenance {
            source_url: page.url.clone(),
            strategy: claim.strategy.name,
            confidence: claim.confidence,
            depth: page.depth,
            fetched_at: page.fetched_at,
        };
        self.reports
            .entry(name.to_string())
            .or_default()
            .entry(claim.value.clone())
            .or_default()
            .push(provenance.clone());

        let candidate = AggregatedField {
            value: claim.value.clone(),
            confidence: claim.confidence,
            strategy: claim.strategy,
            provenance,
            sources: Vec::new(),
        };
        if let Some(current) = self.fields.get_mut(name) {
            if outranks(&candidate, current) {
                *current = candidate;
            }
        } else {
            self.fields.insert(name.to_string(), candidate);
        }
    }

    fn finish(self) -> BTreeMap<String, AggregatedField> {
        let FieldTable {
            mut fields,
            reports,
        } = self;

        for (name, field) in fields.iter_mut() {
            let mut sources = reports
                .get(name)
                .and_then(|values| values.get(&field.value))
                .cloned()
                .unwrap_or_default();
            sources.sort_by(|a, b| a.source_url.cmp(&b.source_url));
            sources.dedup_by(|a, b| a.source_url == b.source_url);
            field.sources = sources;
        }
        fields
    }
}

/// Total order over claims: confidence, strategy priority, shallower depth,
/// smaller source URL
fn outranks(claim: &AggregatedField, current: &AggregatedField) -> bool {
    compare_claims(
        claim.confidence,
        claim.strategy,
        current.confidence,
        current.strategy,
    )
    .then_with(|| current.provenance.depth.cmp(&claim.provenance.depth))
    .then_with(|| {
        current
            .provenance
            .source_url
            .cmp(&claim.provenance.source_url)
    })
        == Ordering::Greater
}

struct Group {
    identifier: String,
    fields: FieldTable,
    pages: BTreeSet<String>,
}

/// Sequential consumer of page records for one crawl
///
/// The result does not depend on the order pages arrive in: claims are
/// ranked by confidence and strategy priority, then by shallower depth, then
/// by smaller source URL. With a fuzzy similarity algorithm a page joins the
/// first group whose identifier it matches.
pub struct DataAggregator {
    identifier_field: String,
    matcher: IdentifierMatcher,
    fields: FieldTable,
    groups: Vec<Group>,
    pages: Vec<MergedPageRecord>,
    graph: PageGraph,
    contact_hints: Vec<ContactHint>,
    seen_hints: HashSet<(ContactKind, String)>,
    manifest: CrawlManifest,
}

impl DataAggregator {
    pub fn new(config: &AggregationConfig) -> Self {
        Self {
            identifier_field: config.identifier_field.clone(),
            matcher: IdentifierMatcher::from_config(config),
            fields: FieldTable::default(),
            groups: Vec::new(),
            pages: Vec::new(),
            graph: PageGraph::new(),
            contact_hints: Vec::new(),
            seen_hints: HashSet::new(),
            manifest: CrawlManifest::default(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Folds one successfully fetched page into the aggregate
    pub fn add_page(&mut self, record: MergedPageRecord) {
        self.graph.add_page(
            record.url.clone(),
            record.depth,
            record.parent_url.clone(),
            PageStatus::Success,
        );

        for hint in &record.contact_hints {
            if self.seen_hints.insert((hint.kind, hint.value.clone())) {
                self.contact_hints.push(hint.clone());
            }
        }

        self.fields.merge_page(&record);

        let identifier = record
            .value(&self.identifier_field)
            .map(normalize_identifier)
            .filter(|id| !id.is_empty());

        if let Some(identifier) = identifier {
            let matcher = self.matcher;
            let index = match self
                .groups
                .iter()
                .position(|g| matcher.matches(&g.identifier, &identifier))
            {
                Some(index) => index,
                None => {
                    debug!("New sub-entity {:?} from {}", identifier, record.url);
                    self.groups.push(Group {
                        identifier,
                        fields: FieldTable::default(),
                        pages: BTreeSet::new(),
                    });
                    self.groups.len() - 1
                }
            };

            let group = &mut self.groups[index];
            group.pages.insert(record.url.clone());
            group.fields.merge_page(&record);
        }

        self.pages.push(record);
    }

    /// Records a page whose fetch failed or timed out
    pub fn add_failure(&mut self, failure: FailedPage) {
        self.graph.add_page(
            failure.url.clone(),
            failure.depth,
            failure.parent_url.clone(),
            failure.status,
        );
        self.manifest.failed.push(failure);
    }

    /// Records a page fetched after cancellation
    pub fn add_discarded(&mut self, url: impl Into<String>) {
        self.manifest.discarded.push(url.into());
    }

    /// Records a fetch that redirected onto a page another task covers
    pub fn add_duplicate(&mut self, duplicate: DuplicatePage) {
        self.manifest.duplicates.push(duplicate);
    }

    /// Produces the final aggregate
    pub fn finish(
        mut self,
        summary: CrawlSummary,
        partial: bool,
        dropped: Vec<String>,
    ) -> EntityAggregate {
        self.graph.finalize();

        self.pages
            .sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
        self.manifest.failed.sort_by(|a, b| a.url.cmp(&b.url));
        self.manifest.discarded.sort();
        self.manifest.duplicates.sort_by(|a, b| a.url.cmp(&b.url));
        self.manifest.dropped = dropped;

        let fields = self.fields.finish();
        let mut conflicts: Vec<FieldConflict> = self
            .pages
            .iter()
            .flat_map(|p| p.conflicts.iter().cloned())
            .collect();
        collect_conflicts(&fields, &self.pages, |_| true, &mut conflicts);

        let mut entities: Vec<SubEntity> = self
            .groups
            .into_iter()
            .map(|group| {
                let group_fields = group.fields.finish();
                let members = &group.pages;
                collect_conflicts(
                    &group_fields,
                    &self.pages,
                    |url| members.contains(url),
                    &mut conflicts,
                );
                SubEntity {
                    identifier: group.identifier,
                    fields: group_fields,
                    pages: group.pages.into_iter().collect(),
                }
            })
            .collect();
        entities.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let mut seen = HashSet::new();
        conflicts.retain(|c| {
            seen.insert((
                c.field.clone(),
                c.kept_value.clone(),
                c.discarded_value.clone(),
                c.discarded_source.clone(),
            ))
        });

        EntityAggregate {
            fields,
            entities,
            pages: self.pages,
            graph: self.graph,
            conflicts,
            contact_hints: self.contact_hints,
            manifest: self.manifest,
            summary,
            partial,
        }
    }
}

/// Lists every page value that lost against the final one
fn collect_conflicts<F>(
    fields: &BTreeMap<String, AggregatedField>,
    pages: &[MergedPageRecord],
    include: F,
    out: &mut Vec<FieldConflict>,
) where
    F: Fn(&str) -> bool,
{
    for page in pages.iter().filter(|p| include(&p.url)) {
        for (name, claim) in &page.fields {
            let Some(kept) = fields.get(name) else {
                continue;
            };
            if kept.value != claim.value {
                out.push(FieldConflict {
                    field: name.clone(),
                    kept_value: kept.value.clone(),
                    kept_strategy: kept.strategy.name,
                    kept_source: kept.provenance.source_url.clone(),
                    discarded_value: claim.value.clone(),
                    discarded_strategy: claim.strategy.name,
                    discarded_source: page.url.clone(),
                });
            }
        }
    }
}
