//! Manifest fetching with media-type discovery.
//!
//! The registry's preferred representation of a manifest is not known up
//! front. Each candidate from [`MediaType::DISCOVERY_ORDER`] is offered in
//! turn as the `Accept` header until the registry answers `200`:
//!
//! ```text
//!  candidate ──GET──▶ status 200 ──────────────▶ accepted
//!      ▲              status 400/401/404 ──┐
//!      └──────────── next candidate ◀──────┘
//!                     any other status ────▶ UnexpectedStatus
//!                     network failure  ────▶ Network (fatal)
//!                     body not JSON    ────▶ InvalidJson
//! ```

use std::sync::Arc;

use crate::error::RegistryError;
use crate::oci::{MediaType, TagList};
use crate::reference::Reference;
use crate::transport::{RegistryResponse, Transport};

/// Statuses meaning "this representation was rejected, try the next one".
const REJECTED: [u16; 3] = [400, 401, 404];

/// Fetches manifests, indexes and tag lists through a [`Transport`].
#[derive(Clone)]
pub struct ManifestFetcher {
    transport: Arc<dyn Transport>,
    candidates: Vec<String>,
}

impl std::fmt::Debug for ManifestFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestFetcher")
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl ManifestFetcher {
    /// Creates a fetcher using the standard candidate order.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            candidates: MediaType::DISCOVERY_ORDER
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Fetches the manifest or index `reference` points at (tag, else digest).
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Network`] aborts immediately and is fatal.
    /// - [`RegistryError::InvalidJson`] if a response body is not JSON.
    /// - [`RegistryError::UnexpectedStatus`] for statuses other than
    ///   200/400/401/404.
    /// - [`RegistryError::NoAcceptableRepresentation`], carrying the last
    ///   response, when every candidate was rejected.
    pub async fn fetch(&self, reference: &Reference) -> Result<RegistryResponse, RegistryError> {
        let url = reference.manifest_url();
        let name = reference.to_string();
        let mut last = None;

        for candidate in &self.candidates {
            let raw = self.transport.get(&url, candidate).await?;
            let response = RegistryResponse::decode(&name, &url, candidate, &raw)?;

            match response.status {
                200 => {
                    tracing::debug!(
                        reference = %name,
                        media = %response.media,
                        digest = %response.digest,
                        "Manifest accepted"
                    );
                    return Ok(response);
                }
                status if REJECTED.contains(&status) => {
                    tracing::debug!(
                        reference = %name,
                        candidate = candidate.as_str(),
                        status,
                        "Representation rejected"
                    );
                    last = Some(response);
                }
                status => {
                    tracing::error!(reference = %name, status, "Unexpected registry status");
                    return Err(RegistryError::UnexpectedStatus { url, status });
                }
            }
        }

        Err(RegistryError::NoAcceptableRepresentation {
            url,
            last: Box::new(last.unwrap_or_default()),
        })
    }

    /// Fetches the tag list of the repository `reference` belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a non-200 status, an invalid
    /// JSON body, or a body without a `tags` array of strings.
    pub async fn fetch_tags(&self, reference: &Reference) -> Result<Vec<String>, RegistryError> {
        let url = reference.tags_url();
        let raw = self.transport.get(&url, MediaType::JSON).await?;
        let response = RegistryResponse::decode(&reference.to_string(), &url, MediaType::JSON, &raw)?;

        if response.status != 200 {
            return Err(RegistryError::UnexpectedStatus {
                url,
                status: response.status,
            });
        }

        let tag_list: TagList =
            serde_json::from_str(&response.content).map_err(|e| RegistryError::InvalidTagList {
                url: url.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(
            repository = reference.repository(),
            count = tag_list.tags.len(),
            "Fetched tag list"
        );
        Ok(tag_list.tags)
    }

    /// Transport used by this fetcher.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}
