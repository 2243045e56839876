//! Graph construction.
//!
//! Starting from a root CNAB index, the builder fetches every tag of the
//! repository, inserts what it gets into the [`ContentGraph`] and expands
//! each newly created index into downlinks to its declared components.
//!
//! Fetches are strictly sequential and the graph has a single writer.

use cnabtool_registry::{Descriptor, RegistryClient, RegistryResponse};

use crate::error::{ContentError, Result};
use crate::graph::{ContentGraph, GraphIssue, ItemKind, Link, RecordId};

/// Builds the content graph of one repository.
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    client: &'a RegistryClient,
    graph: ContentGraph,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder with an empty graph.
    #[must_use]
    pub fn new(client: &'a RegistryClient) -> Self {
        Self {
            client,
            graph: ContentGraph::new(),
        }
    }

    /// Adds the root the command started from.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::UnexpectedRootMediaType`] if the root is not
    /// an OCI index and [`ContentError::MissingManifestsKey`] if it cannot
    /// be expanded.
    pub fn add_root(&mut self, root: &RegistryResponse) -> Result<RecordId> {
        if !root.media.is_index() {
            tracing::error!(
                reference = %root.reference,
                media = %root.media,
                "Root is not a CNAB index"
            );
            return Err(ContentError::UnexpectedRootMediaType {
                reference: root.reference.clone(),
                media: root.media.to_string(),
                content: root.pretty_content(),
            });
        }

        let tag = self.client.reference().tag().unwrap_or_default();
        self.insert(root, tag)
    }

    /// Inserts a fetched response under `tag`, expanding it if it is a new index.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::MissingManifestsKey`] if a new index has no
    /// `manifests` array. The record itself stays in the graph.
    pub fn insert(&mut self, response: &RegistryResponse, tag: &str) -> Result<RecordId> {
        let (id, created) = self.graph.insert_or_get(response, tag);
        if created && response.media.is_index() {
            self.expand_cnab_index(id, response)?;
        }
        Ok(id)
    }

    /// Reads the `manifests` array of an index into downlinks.
    ///
    /// Only component manifests become downlinks; their digests are queued
    /// for resolution.
    fn expand_cnab_index(&mut self, id: RecordId, response: &RegistryResponse) -> Result<()> {
        let manifests = declared_manifests(response)?;
        let mut downlinks: Vec<Link> = Vec::new();

        for descriptor in manifests {
            let annotation = descriptor.cnab_role();
            tracing::debug!(
                media = %descriptor.media_type,
                annotation = %annotation,
                digest = %descriptor.digest,
                "Declared manifest"
            );

            if !descriptor.media_type.is_component_manifest() {
                continue;
            }
            if descriptor.digest.is_empty() {
                tracing::error!(
                    index = %response.digest,
                    media = %descriptor.media_type,
                    "Component entry has no digest"
                );
                continue;
            }
            if downlinks.iter().any(|link| link.digest == descriptor.digest) {
                continue;
            }

            self.graph.enqueue(&descriptor.digest);
            downlinks.push(Link {
                digest: descriptor.digest,
                annotation,
            });
        }

        if let Some(record) = self.graph.get_mut(id) {
            tracing::debug!(
                digest = %record.digest,
                links = downlinks.len(),
                "Expanded CNAB index"
            );
            record.downlinks = downlinks;
        }
        Ok(())
    }

    /// Fetches every tag of the repository into the graph.
    ///
    /// Per-tag failures are logged, recorded as [`GraphIssue`]s and skipped.
    ///
    /// # Errors
    ///
    /// Fails if the tag list cannot be fetched or a fatal registry error
    /// (network, authentication) occurs.
    pub async fn crawl(&mut self) -> Result<()> {
        let tags = self.client.list_tags().await?;
        tracing::info!(tags = ?tags, "Project tags");

        for tag in tags {
            tracing::debug!(tag = %tag, "Fetching tag");

            let response = match self.client.get_tag(&tag).await {
                Ok(response) => response,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::error!(tag = %tag, error = %e, "Can't fetch index for tag");
                    self.graph.record_issue(GraphIssue::SkippedTag {
                        tag,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if let Err(e) = self.insert(&response, &tag) {
                tracing::error!(tag = %tag, error = %e, "Can't expand CNAB index");
                self.graph.record_issue(GraphIssue::InvalidIndex {
                    tag,
                    reason: e.to_string(),
                });
            }
        }

        tracing::info!(
            records = self.graph.len(),
            indexes = self
                .graph
                .records()
                .filter(|r| r.kind == ItemKind::CnabIndex)
                .count(),
            "Crawl finished"
        );
        Ok(())
    }

    /// Graph built so far.
    #[must_use]
    pub const fn graph(&self) -> &ContentGraph {
        &self.graph
    }

    /// Hands over the graph.
    #[must_use]
    pub fn finish(self) -> ContentGraph {
        self.graph
    }
}

/// Parses the `manifests` array of an index body.
///
/// Entries are read leniently; see [`Descriptor::from_entry`].
fn declared_manifests(response: &RegistryResponse) -> Result<Vec<Descriptor>> {
    let missing = |reason: String| ContentError::MissingManifestsKey {
        digest: response.digest.clone(),
        reason,
    };

    let body: serde_json::Value =
        serde_json::from_str(&response.content).map_err(|e| missing(e.to_string()))?;

    let entries = match body.get("manifests") {
        Some(serde_json::Value::Array(entries)) => entries,
        Some(other) => return Err(missing(format!("manifests must be an array, got {other}"))),
        None => return Err(missing("key is absent".to_string())),
    };

    Ok(entries.iter().map(Descriptor::from_entry).collect())
}
