//! # cnabtool content
//!
//! Inspection and safe teardown of CNAB bundles stored in a registry.
//!
//! A repository may hold several bundles sharing components. This crate
//! builds the content graph of the whole repository, counts how many
//! bundles use each component, and deletes a bundle together with only the
//! components no other bundle uses.
//!
//! ## Pipeline
//!
//! ```text
//! get_manifest ──▶ GraphBuilder ──▶ reachability::complete ──▶ planner::plan ──▶ planner::execute
//!   (root)          (crawl tags)        (uplink counts)          (safe order)      (DELETE / dry run)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use cnabtool_content::{delete_cnab, get_manifest, inspect, DeleteOptions};
//! use cnabtool_registry::RegistryConfig;
//!
//! # async fn run() -> cnabtool_content::Result<()> {
//! let (root, client) = get_manifest(&RegistryConfig::new(), "registry.example.com/bundles/app:v1").await?;
//! let graph = inspect(&client, &root).await?;
//! let report = delete_cnab(&client, &graph, DeleteOptions::new().with_dry_run(true), |_| {}).await?;
//! assert_eq!(report.plan.entries.last().map(|e| e.tag.as_str()), Some("v1"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod graph;
pub mod planner;
pub mod reachability;
pub mod report;

pub use builder::GraphBuilder;
pub use error::{ContentError, Result};
pub use graph::{ContentGraph, GraphIssue, ItemKind, Link, ManifestRecord, RecordId};
pub use planner::{DeleteOptions, DeletionOutcome, DeletionPlan, DeletionStatus, PlanEntry};
pub use reachability::Reachability;
pub use report::{DeletionReport, RawReport, ShortReport};

use cnabtool_registry::{RegistryClient, RegistryConfig, RegistryResponse};

/// Connects to the registry of `reference` and fetches the manifest it points at.
///
/// # Errors
///
/// Returns an error if the reference is malformed, the client cannot be
/// created, or the fetch fails.
pub async fn get_manifest(
    config: &RegistryConfig,
    reference: &str,
) -> Result<(RegistryResponse, RegistryClient)> {
    let client = RegistryClient::connect(config, reference)?;
    tracing::debug!(reference = %client.reference(), "Fetching manifest");
    let response = client.get_manifest().await?;
    Ok((response, client))
}

/// Builds and completes the content graph of the repository `root` belongs to.
///
/// # Errors
///
/// Fails if the root is not a valid CNAB index, the tag list cannot be
/// fetched, or a fatal registry error occurs. Per-tag problems are recorded
/// on the graph instead.
pub async fn inspect(client: &RegistryClient, root: &RegistryResponse) -> Result<ContentGraph> {
    let mut builder = GraphBuilder::new(client);
    builder.add_root(root)?;
    builder.crawl().await?;

    let mut graph = builder.finish();
    let summary = reachability::complete(&mut graph);
    tracing::info!(
        records = graph.len(),
        lost = summary.lost,
        issues = graph.issues().len(),
        "Inspection complete"
    );
    Ok(graph)
}

/// Deletes the bundle tagged by the client reference and its exclusive components.
///
/// `on_outcome` is called after every plan entry, so callers can report
/// completed deletions even when a later one aborts the run.
///
/// # Errors
///
/// Returns [`ContentError::TargetNotFound`] if the reference carries no tag
/// or the tag was not inspected, and a registry error if a deletion fails at
/// the connection level.
pub async fn delete_cnab<F>(
    client: &RegistryClient,
    graph: &ContentGraph,
    options: DeleteOptions,
    on_outcome: F,
) -> Result<DeletionReport>
where
    F: FnMut(&DeletionOutcome),
{
    let target = client
        .reference()
        .tag()
        .ok_or_else(|| ContentError::TargetNotFound {
            tag: client.reference().tag_or_digest().to_string(),
        })?;

    let plan = planner::plan(graph, target)?;
    let outcomes = planner::execute(client, &plan, options, on_outcome).await?;

    Ok(DeletionReport {
        dry_run: options.dry_run,
        plan,
        outcomes,
    })
}
