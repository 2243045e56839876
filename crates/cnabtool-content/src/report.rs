//! Report model written to the output sink.

use serde::Serialize;

use crate::graph::{ContentGraph, GraphIssue, ManifestRecord};
use crate::planner::{DeletionOutcome, DeletionPlan};

/// One line of the short report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortItem {
    /// Tag.
    pub tag: String,
    /// Digest the tag points at.
    pub digest: String,
    /// Role of the record.
    pub annotation: String,
    /// `Last-Modified` of the record.
    pub date: String,
    /// Media type.
    pub media: String,
    /// Number of indexes using the record.
    pub count: usize,
    /// Number of components the record declares.
    pub links: usize,
    /// Declared components missing from the repository.
    pub lost: usize,
}

/// Per-tag summary of an inspected repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortReport {
    /// Reference the inspection started from.
    pub reference: String,
    /// One item per tag, ordered by tag.
    #[serde(rename = "itemList")]
    pub item_list: Vec<ShortItem>,
}

impl ShortReport {
    /// Summarizes `graph`.
    #[must_use]
    pub fn new(reference: &str, graph: &ContentGraph) -> Self {
        Self {
            reference: reference.to_string(),
            item_list: graph
                .tags()
                .map(|(tag, record)| ShortItem {
                    tag: tag.to_string(),
                    digest: record.digest.clone(),
                    annotation: record.kind.to_string(),
                    date: record.last_modified.clone(),
                    media: record.media.to_string(),
                    count: record.uplinks.len(),
                    links: record.downlinks.len(),
                    lost: record.lost,
                })
                .collect(),
        }
    }
}

/// A tag and the full record behind it.
#[derive(Debug, Serialize)]
pub struct RawItem<'a> {
    /// Tag.
    pub tag: &'a str,
    /// Record the tag points at.
    pub record: &'a ManifestRecord,
}

/// Everything known about an inspected repository.
#[derive(Debug, Serialize)]
pub struct RawReport<'a> {
    /// Reference the inspection started from.
    pub reference: &'a str,
    /// One item per tag, ordered by tag.
    pub items: Vec<RawItem<'a>>,
    /// Declared digests that never resolved.
    pub pending: Vec<&'a str>,
    /// Findings recorded during the crawl.
    pub issues: &'a [GraphIssue],
}

impl<'a> RawReport<'a> {
    /// Borrows the full contents of `graph`.
    #[must_use]
    pub fn new(reference: &'a str, graph: &'a ContentGraph) -> Self {
        Self {
            reference,
            items: graph
                .tags()
                .map(|(tag, record)| RawItem { tag, record })
                .collect(),
            pending: graph.pending().collect(),
            issues: graph.issues(),
        }
    }
}

/// Result of a delete command.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    /// Whether deletions were only announced.
    pub dry_run: bool,
    /// Computed plan.
    pub plan: DeletionPlan,
    /// Outcome per plan entry, in execution order.
    pub outcomes: Vec<DeletionOutcome>,
}

impl DeletionReport {
    /// Number of deletions the registry rejected.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }
}
