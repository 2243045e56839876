//! `content delete`: remove a CNAB and the components only it uses.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use cnabtool_content::{DeleteOptions, DeletionOutcome, DeletionStatus};
use cnabtool_registry::Reference;

use crate::commands::inspect;
use crate::output;
use crate::settings::Settings;

/// Arguments for the delete command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Reference to a CNAB index, `registry/repository:tag`
    pub reference: String,

    /// Announce deletions without issuing them
    #[arg(long)]
    pub dry_run: bool,
}

/// Runs the delete command.
///
/// # Errors
///
/// Returns an error if the reference has no tag, the repository cannot be
/// inspected, or a deletion fails at the connection level.
pub async fn run(settings: &Settings, args: &DeleteArgs) -> Result<ExitCode> {
    let reference = Reference::parse(&args.reference)
        .with_context(|| format!("Can not parse reference {}", args.reference))?;
    if reference.tag().is_none() {
        anyhow::bail!("Delete needs a tagged reference, got {}", args.reference);
    }

    let (root, client, graph) = inspect::crawl(settings, &args.reference).await?;
    if settings.is_debug() {
        inspect::print_report(&root.reference, &graph, false)?;
    }

    let options = DeleteOptions::new().with_dry_run(args.dry_run);
    let announce = settings.shows_reports();
    let report = cnabtool_content::delete_cnab(&client, &graph, options, |outcome| {
        if announce {
            print_outcome(outcome);
        }
    })
    .await
    .context("Failed to delete CNAB, deletions announced above were applied")?;

    if settings.is_debug() {
        output::print_json(&report)?;
    }

    if report.failures() > 0 {
        tracing::error!(failures = report.failures(), "Some deletions were rejected");
        return Ok(ExitCode::FAILURE);
    }
    Ok(inspect::exit_code(&graph))
}

/// Prints `Delete <kind> <url>`, followed by the registry's answer on rejection.
fn print_outcome(outcome: &DeletionOutcome) {
    println!("{}", announcement(outcome));
    if let DeletionStatus::Failed { body, .. } = &outcome.status {
        println!("{body}");
    }
}

fn announcement(outcome: &DeletionOutcome) -> String {
    format!("Delete {} {}", outcome.entry.kind, outcome.url)
}

#[cfg(test)]
mod tests {
    use cnabtool_content::{ItemKind, PlanEntry};

    use super::*;

    #[test]
    fn test_announcement() {
        let outcome = DeletionOutcome {
            entry: PlanEntry {
                tag: "d2".to_string(),
                digest: "sha256:d2".to_string(),
                kind: ItemKind::Declared("postgres".to_string()),
            },
            url: "https://registry.example.com/v2/app/manifests/sha256:d2".to_string(),
            status: DeletionStatus::Deleted,
        };
        assert_eq!(
            announcement(&outcome),
            "Delete postgres https://registry.example.com/v2/app/manifests/sha256:d2"
        );
    }
}
