//! Registry client bound to one repository.
//!
//! Exposes exactly the operations CNAB inspection and teardown need: list
//! tags, get a manifest with media negotiation, delete a manifest by digest.

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::fetcher::ManifestFetcher;
use crate::reference::Reference;
use crate::transport::{HttpTransport, RawResponse, RegistryResponse, Transport};

/// Client for the repository a reference points into.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    reference: Reference,
    fetcher: ManifestFetcher,
}

impl RegistryClient {
    /// Parses `reference` and creates an HTTP-backed client for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed or the HTTP client
    /// cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cnabtool_registry::{RegistryClient, RegistryConfig};
    ///
    /// let client = RegistryClient::connect(
    ///     &RegistryConfig::new(),
    ///     "registry.example.com/bundles/app:v1",
    /// )?;
    /// assert_eq!(client.reference().repository(), "bundles/app");
    /// # Ok::<(), cnabtool_registry::RegistryError>(())
    /// ```
    pub fn connect(config: &RegistryConfig, reference: &str) -> Result<Self, RegistryError> {
        let reference = Reference::parse(reference)?.with_scheme(config.scheme.as_str());
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(reference, Arc::new(transport)))
    }

    /// Creates a client over an existing transport.
    #[must_use]
    pub fn with_transport(reference: Reference, transport: Arc<dyn Transport>) -> Self {
        Self {
            reference,
            fetcher: ManifestFetcher::new(transport),
        }
    }

    /// The reference this client was created for.
    #[must_use]
    pub const fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Fetches the manifest the client reference points at.
    ///
    /// # Errors
    ///
    /// See [`ManifestFetcher::fetch`].
    pub async fn get_manifest(&self) -> Result<RegistryResponse, RegistryError> {
        self.fetcher.fetch(&self.reference).await
    }

    /// Fetches the manifest for another tag of the same repository.
    ///
    /// # Errors
    ///
    /// See [`ManifestFetcher::fetch`].
    pub async fn get_tag(&self, tag: &str) -> Result<RegistryResponse, RegistryError> {
        self.fetcher.fetch(&self.reference.with_tag(tag)).await
    }

    /// Lists all tags of the repository.
    ///
    /// # Errors
    ///
    /// See [`ManifestFetcher::fetch_tags`].
    pub async fn list_tags(&self) -> Result<Vec<String>, RegistryError> {
        self.fetcher.fetch_tags(&self.reference).await
    }

    /// URL a manifest with the given digest is deleted through.
    #[must_use]
    pub fn delete_url(&self, digest: &str) -> String {
        self.reference.manifest_url_for(digest)
    }

    /// Deletes the manifest with the given digest.
    ///
    /// The status is not interpreted; registries answer `202` on success.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Network`] on connection-level failures.
    pub async fn delete_manifest(&self, digest: &str) -> Result<RawResponse, RegistryError> {
        let url = self.delete_url(digest);
        self.fetcher.transport().delete(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::MediaType;
    use crate::testing::{json_response, ScriptedTransport};

    #[test]
    fn test_connect_rejects_bad_reference() {
        let err = RegistryClient::connect(&RegistryConfig::new(), "localhost/app:v1").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidReference { .. }));
    }

    #[test]
    fn test_connect_applies_scheme() {
        let config = RegistryConfig::new().with_scheme("http");
        let client = RegistryClient::connect(&config, "registry.example.com/app:v1").unwrap();
        assert_eq!(
            client.delete_url("sha256:1"),
            "http://registry.example.com/v2/app/manifests/sha256:1"
        );
    }

    #[tokio::test]
    async fn test_get_tag_and_delete() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .serve_manifest(
                    "https://registry.example.com/v2/app/manifests/v2",
                    MediaType::OCI_INDEX,
                    "sha256:two",
                    r#"{"manifests": []}"#,
                )
                .on_delete(
                    "https://registry.example.com/v2/app/manifests/sha256:two",
                    json_response(202, ""),
                ),
        );
        let reference = Reference::parse("registry.example.com/app:v1").unwrap();
        let client = RegistryClient::with_transport(reference, transport.clone());

        let response = client.get_tag("v2").await.unwrap();
        assert_eq!(response.digest, "sha256:two");

        let deleted = client.delete_manifest(&response.digest).await.unwrap();
        assert_eq!(deleted.status, 202);
        assert_eq!(transport.requests_with("DELETE").len(), 1);
    }
}
