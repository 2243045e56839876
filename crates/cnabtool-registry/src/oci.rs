//! OCI and Docker distribution types.
//!
//! Only the subset needed to read CNAB indexes and tag lists.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A manifest media type as announced by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MediaType(String);

impl MediaType {
    /// OCI image index; a CNAB bundle is published as one.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// OCI image manifest.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// Docker image manifest, schema 2.
    pub const V2_MANIFEST: &'static str = "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list.
    pub const V2_LIST: &'static str = "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Docker container image, schema 1.
    pub const V1_MANIFEST: &'static str = "application/vnd.docker.container.image.v1+json";

    /// Signed Docker manifest, schema 1.
    pub const V1_PRETTY: &'static str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

    /// Generic JSON fallback.
    pub const JSON: &'static str = "application/json";

    /// Candidates offered during manifest discovery, in order.
    ///
    /// `V2_MANIFEST` precedes the generic fallbacks because only it yields a
    /// content digest that later delete calls accept.
    pub const DISCOVERY_ORDER: [&'static str; 5] = [
        Self::OCI_INDEX,
        Self::V2_MANIFEST,
        Self::V1_MANIFEST,
        Self::V1_PRETTY,
        Self::JSON,
    ];

    /// Creates a new media type.
    #[must_use]
    pub fn new(media_type: impl Into<String>) -> Self {
        Self(media_type.into())
    }

    /// Returns the media type string as received.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the media type without parameters (`; charset=...`).
    #[must_use]
    pub fn essence(&self) -> &str {
        self.0.split(';').next().unwrap_or_default().trim()
    }

    /// Returns true if the essence equals `other`, ignoring ASCII case.
    #[must_use]
    pub fn is(&self, other: &str) -> bool {
        self.essence().eq_ignore_ascii_case(other)
    }

    /// Returns true for an OCI image index.
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.is(Self::OCI_INDEX)
    }

    /// Returns true for media types that CNAB indexes reference as components.
    #[must_use]
    pub fn is_component_manifest(&self) -> bool {
        self.is(Self::OCI_MANIFEST) || self.is(Self::V2_MANIFEST)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for MediaType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// CNAB annotation keys used on index entries.
pub mod annotations {
    /// Role of the entry inside the bundle (`config`, `invocation`, `component`).
    pub const MANIFEST_TYPE: &str = "io.cnab.manifest.type";

    /// Component name, present when the role is `component`.
    pub const COMPONENT_NAME: &str = "io.cnab.component.name";

    /// Role value marking a named component.
    pub const COMPONENT: &str = "component";
}

/// An entry of an image index `manifests` array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(default)]
    pub media_type: MediaType,

    /// Digest of the referenced content.
    #[serde(default)]
    pub digest: String,

    /// Size in bytes of the referenced content.
    #[serde(default)]
    pub size: u64,

    /// Annotations (key-value metadata).
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl Descriptor {
    /// Reads an entry field by field.
    ///
    /// A field of the wrong type is left at its default instead of
    /// rejecting the entry, so a bad `size` or `annotations` value never
    /// hides the digest it describes.
    #[must_use]
    pub fn from_entry(entry: &serde_json::Value) -> Self {
        let text = |key: &str| {
            entry
                .get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let annotations = entry
            .get("annotations")
            .and_then(serde_json::Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            media_type: MediaType::new(text("mediaType")),
            digest: text("digest"),
            size: entry
                .get("size")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or_default(),
            annotations,
        }
    }

    /// Role this entry plays in a CNAB bundle.
    ///
    /// For `component` entries this is the component name; otherwise the
    /// `io.cnab.manifest.type` value, or an empty string when absent.
    #[must_use]
    pub fn cnab_role(&self) -> String {
        let role = self
            .annotations
            .get(annotations::MANIFEST_TYPE)
            .map(String::as_str)
            .unwrap_or_default();

        if role == annotations::COMPONENT {
            self.annotations
                .get(annotations::COMPONENT_NAME)
                .cloned()
                .unwrap_or_default()
        } else {
            role.to_string()
        }
    }
}

/// Response from the `/v2/<name>/tags/list` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagList {
    /// Repository name.
    #[serde(default)]
    pub name: String,

    /// List of tags.
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_essence_ignores_parameters() {
        let mt = MediaType::new("application/vnd.oci.image.index.v1+json; charset=utf-8");
        assert_eq!(mt.essence(), MediaType::OCI_INDEX);
        assert!(mt.is_index());
    }

    #[test]
    fn test_component_manifest_types() {
        assert!(MediaType::new(MediaType::OCI_MANIFEST).is_component_manifest());
        assert!(MediaType::new(MediaType::V2_MANIFEST).is_component_manifest());
        assert!(!MediaType::new(MediaType::OCI_INDEX).is_component_manifest());
        assert!(!MediaType::new(MediaType::V2_LIST).is_component_manifest());
    }

    #[test]
    fn test_discovery_order() {
        assert_eq!(MediaType::DISCOVERY_ORDER[0], MediaType::OCI_INDEX);
        assert_eq!(MediaType::DISCOVERY_ORDER[1], MediaType::V2_MANIFEST);
        assert_eq!(MediaType::DISCOVERY_ORDER[4], MediaType::JSON);
    }

    #[test]
    fn test_descriptor_component_role() {
        let json = r#"{
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": "sha256:aaa",
            "size": 1024,
            "annotations": {
                "io.cnab.manifest.type": "component",
                "io.cnab.component.name": "postgres"
            }
        }"#;
        let desc: Descriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.cnab_role(), "postgres");
        assert_eq!(desc.digest, "sha256:aaa");
    }

    #[test]
    fn test_descriptor_plain_role_and_missing_fields() {
        let desc: Descriptor = serde_json::from_str(
            r#"{"digest": "sha256:bbb", "annotations": {"io.cnab.manifest.type": "config"}}"#,
        )
        .unwrap();
        assert_eq!(desc.cnab_role(), "config");
        assert_eq!(desc.media_type.as_str(), "");

        let bare: Descriptor = serde_json::from_str("{}").unwrap();
        assert_eq!(bare.cnab_role(), "");
    }

    #[test]
    fn test_descriptor_from_entry_tolerates_bad_optional_fields() {
        let entry = serde_json::json!({
            "mediaType": MediaType::V2_MANIFEST,
            "digest": "sha256:ccc",
            "size": "512",
            "annotations": null,
        });
        let desc = Descriptor::from_entry(&entry);
        assert_eq!(desc.digest, "sha256:ccc");
        assert!(desc.media_type.is_component_manifest());
        assert_eq!(desc.size, 0);
        assert_eq!(desc.cnab_role(), "");

        let entry = serde_json::json!({
            "mediaType": MediaType::OCI_MANIFEST,
            "digest": "sha256:ddd",
            "size": 10,
            "annotations": {
                "io.cnab.manifest.type": "component",
                "io.cnab.component.name": "redis",
                "org.example.build": 7,
            },
        });
        let desc = Descriptor::from_entry(&entry);
        assert_eq!(desc.size, 10);
        assert_eq!(desc.cnab_role(), "redis");
        assert_eq!(desc.annotations.len(), 2);

        let desc = Descriptor::from_entry(&serde_json::json!("not an object"));
        assert!(desc.digest.is_empty());
    }

    #[test]
    fn test_tag_list_deserialization() {
        let json = r#"{
            "name": "bundles/app",
            "tags": ["v1.0.0", "v1.1.0", "latest"]
        }"#;

        let tags: TagList = serde_json::from_str(json).unwrap();
        assert_eq!(tags.name, "bundles/app");
        assert_eq!(tags.tags.len(), 3);
    }
}
