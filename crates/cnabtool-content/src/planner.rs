//! Deletion planning and execution.
//!
//! A plan for target `T` lists every component used by `T` alone, followed
//! by `T` itself. Components with more than one uplink are shared with other
//! bundles and never planned.

use cnabtool_registry::RegistryClient;
use serde::Serialize;

use crate::error::{ContentError, Result};
use crate::graph::{ContentGraph, ItemKind};

/// Options for executing a deletion plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Announce deletions without issuing them.
    pub dry_run: bool,
}

impl DeleteOptions {
    /// Creates options for a real run.
    #[must_use]
    pub const fn new() -> Self {
        Self { dry_run: false }
    }

    /// Sets dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// One planned deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// Tag the record is known by.
    pub tag: String,
    /// Digest to delete.
    pub digest: String,
    /// Role of the record.
    pub kind: ItemKind,
}

/// Ordered deletions for one target; the target is always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    /// Target tag.
    pub target: String,
    /// Entries in execution order.
    pub entries: Vec<PlanEntry>,
}

impl DeletionPlan {
    /// Tags in execution order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.tag.as_str())
    }
}

/// Computes the deletion plan for `target`.
///
/// The graph must have been completed by a reachability pass.
///
/// # Errors
///
/// Returns [`ContentError::TargetNotFound`] if no record carries the tag.
pub fn plan(graph: &ContentGraph, target: &str) -> Result<DeletionPlan> {
    let root = graph
        .by_tag(target)
        .ok_or_else(|| ContentError::TargetNotFound {
            tag: target.to_string(),
        })?;

    let mut entries = Vec::new();
    for link in &root.downlinks {
        let Some(child) = graph.by_digest(&link.digest) else {
            continue;
        };
        tracing::debug!(
            component = %link.digest,
            count = child.uplinks.len(),
            tag = %child.tag,
            "Down link"
        );

        let exclusive = child.uplinks.len() == 1 && child.has_uplink(&root.digest);
        if !exclusive || child.digest == root.digest {
            continue;
        }
        if child.tag.is_empty() {
            tracing::warn!(component = %child.digest, "Exclusive component has no tag");
            continue;
        }

        entries.push(PlanEntry {
            tag: child.tag.clone(),
            digest: child.digest.clone(),
            kind: child.kind.clone(),
        });
    }

    entries.push(PlanEntry {
        tag: target.to_string(),
        digest: root.digest.clone(),
        kind: root.kind.clone(),
    });

    let plan = DeletionPlan {
        target: target.to_string(),
        entries,
    };
    tracing::info!(tags = ?plan.tags().collect::<Vec<_>>(), "Tags for delete");
    Ok(plan)
}

/// Result of one attempted deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeletionStatus {
    /// Not issued because of dry-run mode.
    Skipped,
    /// Registry answered `202`.
    Deleted,
    /// Registry answered something else.
    Failed {
        /// HTTP status.
        code: u16,
        /// Response body, pretty-printed when it is JSON.
        body: String,
    },
}

/// Outcome of one plan entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionOutcome {
    /// Planned entry.
    pub entry: PlanEntry,
    /// URL the deletion was sent to.
    pub url: String,
    /// What happened.
    #[serde(flatten)]
    pub status: DeletionStatus,
}

impl DeletionOutcome {
    /// Returns true if the registry rejected the deletion.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, DeletionStatus::Failed { .. })
    }
}

/// Executes a plan in order.
///
/// `on_outcome` sees each outcome as soon as it is known. A rejected
/// deletion is logged and the remaining entries are still attempted.
/// Nothing is rolled back.
///
/// # Errors
///
/// Returns a registry error if a request fails at the connection level;
/// entries after it are not attempted. Outcomes already passed to
/// `on_outcome` have taken effect.
pub async fn execute<F>(
    client: &RegistryClient,
    plan: &DeletionPlan,
    options: DeleteOptions,
    mut on_outcome: F,
) -> Result<Vec<DeletionOutcome>>
where
    F: FnMut(&DeletionOutcome),
{
    let mut outcomes = Vec::with_capacity(plan.entries.len());

    for entry in &plan.entries {
        let url = client.delete_url(&entry.digest);

        if options.dry_run {
            tracing::info!(tag = %entry.tag, url = %url, "Dry run, skipping delete");
            let outcome = DeletionOutcome {
                entry: entry.clone(),
                url,
                status: DeletionStatus::Skipped,
            };
            on_outcome(&outcome);
            outcomes.push(outcome);
            continue;
        }

        let response = client.delete_manifest(&entry.digest).await?;
        let status = if response.status == 202 {
            tracing::info!(tag = %entry.tag, "Item was deleted successfully");
            DeletionStatus::Deleted
        } else {
            let body = pretty_body(&response.body);
            tracing::error!(
                tag = %entry.tag,
                status = response.status,
                body = %body,
                "Delete rejected"
            );
            DeletionStatus::Failed {
                code: response.status,
                body,
            }
        };

        let outcome = DeletionOutcome {
            entry: entry.clone(),
            url,
            status,
        };
        on_outcome(&outcome);
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

fn pretty_body(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}
