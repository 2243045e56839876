//! `content manifest`: fetch one manifest through media-type discovery.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use crate::output;
use crate::settings::Settings;

/// Arguments for the manifest command.
#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Reference, `registry/repository[:tag][@sha256:digest]`
    pub reference: String,
}

/// Runs the manifest command.
///
/// # Errors
///
/// Returns an error if the reference is invalid or no representation of the
/// manifest could be fetched.
pub async fn run(settings: &Settings, args: &ManifestArgs) -> Result<ExitCode> {
    let (response, _client) =
        cnabtool_content::get_manifest(&settings.registry_config(), &args.reference)
            .await
            .with_context(|| format!("Failed to get manifest {}", args.reference))?;

    tracing::debug!(
        media = %response.media,
        digest = %response.digest,
        "Manifest fetched"
    );

    if settings.shows_reports() {
        output::print_json(&output::response_json(&response)?)?;
    }
    Ok(ExitCode::SUCCESS)
}
