//! `content inspect`: crawl a CNAB repository and report what uses what.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use cnabtool_content::{ContentError, ContentGraph, GraphIssue, RawReport, ShortReport};
use cnabtool_registry::{RegistryClient, RegistryResponse};

use crate::output;
use crate::settings::Settings;

/// Arguments for the inspect command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Reference to a CNAB index, `registry/repository:tag`
    pub reference: String,

    /// Print full records instead of the summary
    #[arg(long)]
    pub raw: bool,
}

/// Runs the inspect command.
///
/// # Errors
///
/// Returns an error if the root is not a CNAB index or the repository
/// cannot be crawled.
pub async fn run(settings: &Settings, args: &InspectArgs) -> Result<ExitCode> {
    let (root, client, graph) = crawl(settings, &args.reference).await?;

    if settings.shows_reports() {
        print_report(&root.reference, &graph, args.raw)?;
    }
    tracing::debug!(reference = %client.reference(), "Inspect finished");

    Ok(exit_code(&graph))
}

/// Fetches the root and builds the completed graph of its repository.
pub async fn crawl(
    settings: &Settings,
    reference: &str,
) -> Result<(RegistryResponse, RegistryClient, ContentGraph)> {
    let (root, client) = cnabtool_content::get_manifest(&settings.registry_config(), reference)
        .await
        .with_context(|| format!("Failed to get manifest {reference}"))?;

    let graph = match cnabtool_content::inspect(&client, &root).await {
        Ok(graph) => graph,
        Err(ContentError::UnexpectedRootMediaType { media, content, .. }) => {
            tracing::error!(body = %content, "Root manifest");
            anyhow::bail!("Unexpected media type {media}, must be a CNAB index");
        }
        Err(e) => return Err(e).context("Failed to inspect repository"),
    };

    Ok((root, client, graph))
}

/// Prints the summary, or every record with `raw`.
pub fn print_report(reference: &str, graph: &ContentGraph, raw: bool) -> Result<()> {
    if raw {
        output::print_json(&RawReport::new(reference, graph))
    } else {
        output::print_json(&ShortReport::new(reference, graph))
    }
}

/// Non-zero when the crawl logged an error.
pub fn exit_code(graph: &ContentGraph) -> ExitCode {
    if has_errors(graph) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Role conflicts are only warnings.
fn has_errors(graph: &ContentGraph) -> bool {
    graph
        .issues()
        .iter()
        .any(|issue| !matches!(issue, GraphIssue::KindConflict { .. }))
}
