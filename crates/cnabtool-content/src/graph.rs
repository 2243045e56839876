//! Content graph of a repository.
//!
//! Records are keyed by digest and created exactly once per digest; tags are
//! aliases onto records. Index records carry downlinks to the components
//! they declare, components carry uplinks back to every index declaring them.
//!
//! ```text
//!   tag ──▶ ┌────────────┐ downlinks ┌─────────────┐
//!           │ CNAB index │──────────▶│  component  │
//!           └────────────┘◀──────────└─────────────┘
//!                           uplinks
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use cnabtool_registry::{MediaType, RegistryResponse};
use serde::{Serialize, Serializer};

/// Position of a record in discovery order.
pub type RecordId = usize;

/// Role of a record in the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// An OCI index, i.e. a CNAB bundle.
    CnabIndex,
    /// An OCI manifest.
    ComponentConfig,
    /// A signed schema 1 Docker manifest.
    Image,
    /// Anything else.
    Other,
    /// Role declared by a parent index annotation.
    Declared(String),
}

impl ItemKind {
    /// Classifies a freshly fetched record by its media type.
    #[must_use]
    pub fn classify(media: &MediaType) -> Self {
        if media.is(MediaType::V1_PRETTY) {
            Self::Image
        } else if media.is(MediaType::OCI_MANIFEST) {
            Self::ComponentConfig
        } else if media.is_index() {
            Self::CnabIndex
        } else {
            Self::Other
        }
    }

    /// Returns a string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CnabIndex => "cnab",
            Self::ComponentConfig => "config",
            Self::Image => "image",
            Self::Other => "other",
            Self::Declared(role) => role.as_str(),
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ItemKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Edge to another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Digest of the record on the other end.
    pub digest: String,
    /// Declared role (downlinks) or parent kind (uplinks).
    pub annotation: String,
}

/// A manifest or index discovered in the repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    /// Content digest; the identity of the record.
    pub digest: String,
    /// Tag the record was first reached through.
    pub tag: String,
    /// Reference the record was fetched with.
    pub reference: String,
    /// Media type announced by the registry.
    pub media: MediaType,
    /// Role of the record.
    pub kind: ItemKind,
    /// `Last-Modified` of the fetch that created the record.
    pub last_modified: String,
    /// Pretty-printed body.
    pub content: String,
    /// Components this record declares, unique by digest.
    pub downlinks: Vec<Link>,
    /// Indexes declaring this record, unique by digest.
    pub uplinks: Vec<Link>,
    /// Declared downlinks not found in the graph.
    pub lost: usize,
}

impl ManifestRecord {
    fn from_response(response: &RegistryResponse, tag: &str) -> Self {
        Self {
            digest: response.digest.clone(),
            tag: tag.to_string(),
            reference: response.reference.clone(),
            media: response.media.clone(),
            kind: ItemKind::classify(&response.media),
            last_modified: response.date.clone(),
            content: response.pretty_content(),
            downlinks: Vec::new(),
            uplinks: Vec::new(),
            lost: 0,
        }
    }

    /// Returns true if this record has an uplink from `digest`.
    #[must_use]
    pub fn has_uplink(&self, digest: &str) -> bool {
        self.uplinks.iter().any(|link| link.digest == digest)
    }
}

/// A finding recorded while building or completing the graph.
///
/// None of these stop the crawl; they are reported alongside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum GraphIssue {
    /// A tag could not be fetched.
    SkippedTag {
        /// Tag that was skipped.
        tag: String,
        /// Error message.
        reason: String,
    },
    /// An index could not be expanded.
    InvalidIndex {
        /// Tag the index was fetched through.
        tag: String,
        /// Error message.
        reason: String,
    },
    /// A declared component is not in the graph.
    DanglingDownlink {
        /// Tag of the declaring index.
        parent_tag: String,
        /// Digest of the declaring index.
        parent_digest: String,
        /// Missing digest.
        child_digest: String,
    },
    /// Two parents declared different roles for the same component.
    KindConflict {
        /// Component digest.
        digest: String,
        /// Role declared earlier.
        previous: String,
        /// Role that replaced it.
        declared: String,
        /// Digest of the parent whose role won.
        parent_digest: String,
    },
}

/// Catalog of everything discovered in one repository.
#[derive(Debug, Default)]
pub struct ContentGraph {
    records: Vec<ManifestRecord>,
    by_digest: HashMap<String, RecordId>,
    by_tag: BTreeMap<String, RecordId>,
    pending: Vec<String>,
    queued: HashSet<String>,
    issues: Vec<GraphIssue>,
}

impl ContentGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the record for `response`, or reuses the one with the same digest.
    ///
    /// `tag` is pointed at the record either way. A reused record is neither
    /// re-classified nor modified otherwise. Returns the record id and whether
    /// it was created.
    pub fn insert_or_get(&mut self, response: &RegistryResponse, tag: &str) -> (RecordId, bool) {
        if let Some(&id) = self.by_digest.get(&response.digest) {
            tracing::debug!(tag, digest = %response.digest, "Record already known");
            if !tag.is_empty() {
                self.by_tag.insert(tag.to_string(), id);
                if self.records[id].tag.is_empty() {
                    self.records[id].tag = tag.to_string();
                }
            }
            return (id, false);
        }

        let record = ManifestRecord::from_response(response, tag);
        tracing::debug!(
            tag,
            digest = %record.digest,
            kind = %record.kind,
            "New record"
        );

        let id = self.records.len();
        self.by_digest.insert(record.digest.clone(), id);
        if !tag.is_empty() {
            self.by_tag.insert(tag.to_string(), id);
        }
        self.records.push(record);
        (id, true)
    }

    /// Record with the given id.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&ManifestRecord> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: RecordId) -> Option<&mut ManifestRecord> {
        self.records.get_mut(id)
    }

    /// Id of the record with the given digest.
    #[must_use]
    pub fn id_by_digest(&self, digest: &str) -> Option<RecordId> {
        self.by_digest.get(digest).copied()
    }

    /// Record with the given digest.
    #[must_use]
    pub fn by_digest(&self, digest: &str) -> Option<&ManifestRecord> {
        self.id_by_digest(digest).and_then(|id| self.get(id))
    }

    /// Record the given tag points at.
    #[must_use]
    pub fn by_tag(&self, tag: &str) -> Option<&ManifestRecord> {
        self.by_tag.get(tag).and_then(|&id| self.get(id))
    }

    /// Records in discovery order.
    pub fn records(&self) -> impl Iterator<Item = &ManifestRecord> {
        self.records.iter()
    }

    /// Tags and the records they point at, ordered by tag.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &ManifestRecord)> {
        self.by_tag
            .iter()
            .map(|(tag, &id)| (tag.as_str(), &self.records[id]))
    }

    /// Ids of records currently classified as CNAB indexes, in discovery order.
    #[must_use]
    pub fn index_ids(&self) -> Vec<RecordId> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.kind == ItemKind::CnabIndex)
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of distinct records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Queues a digest for resolution; digests already queued are ignored.
    pub(crate) fn enqueue(&mut self, digest: &str) {
        if self.queued.insert(digest.to_string()) {
            self.pending.push(digest.to_string());
        }
    }

    /// Queued digests that never resolved to a record, in queue order.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending
            .iter()
            .map(String::as_str)
            .filter(|digest| !self.by_digest.contains_key(*digest))
    }

    pub(crate) fn record_issue(&mut self, issue: GraphIssue) {
        self.issues.push(issue);
    }

    /// Findings recorded so far.
    #[must_use]
    pub fn issues(&self) -> &[GraphIssue] {
        &self.issues
    }
}
