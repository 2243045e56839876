//! Registry reference parsing.
//!
//! A reference has the shape `registry/repository[:tag][@sha256:digest]`:
//!
//! - `registry.example.com/bundles/app:v1.2.3` → tag reference
//! - `registry.example.com/bundles/app@sha256:abc...` → digest reference
//! - `registry.example.com/bundles/app:v1.2.3@sha256:abc...` → both
//!
//! The first path segment is always the registry and must look like a
//! domain (contain a dot); there is no implicit default registry.

use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Scheme used when none has been configured.
pub const DEFAULT_SCHEME: &str = "https";

const DIGEST_MARKER: &str = "@sha256:";

/// Parsed registry reference. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    scheme: String,
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl Reference {
    /// Parses a reference string.
    ///
    /// # Examples
    ///
    /// ```
    /// use cnabtool_registry::Reference;
    ///
    /// let r = Reference::parse("registry.example.com/repository/image:v1.2.3@sha256:456").unwrap();
    /// assert_eq!(r.registry(), "registry.example.com");
    /// assert_eq!(r.repository(), "repository/image");
    /// assert_eq!(r.tag(), Some("v1.2.3"));
    /// assert_eq!(r.digest(), Some("sha256:456"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if the string does not
    /// follow the grammar.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let invalid = |reason| RegistryError::InvalidReference {
            reference: input.to_string(),
            reason,
        };

        let (registry, remainder) = input
            .split_once('/')
            .ok_or_else(|| invalid("reference does not contain a registry part"))?;

        if !registry.contains('.') {
            return Err(invalid("registry part must be a domain name"));
        }

        if !remainder.contains(':') && !remainder.contains('@') {
            return Err(invalid("reference does not contain a tag or digest part"));
        }

        // Digest suffix first, so the colon inside `sha256:` never reads as a tag.
        let (name_tag, digest) = if remainder.contains(DIGEST_MARKER) {
            match remainder.rsplit_once('@') {
                Some((prefix, digest)) => (prefix, non_empty(digest)),
                None => (remainder, None),
            }
        } else {
            (remainder, None)
        };

        let (repository, tag) = match name_tag.split_once(':') {
            Some((repository, tag)) => (repository, non_empty(tag)),
            None => (name_tag, None),
        };

        if registry.is_empty() || repository.is_empty() {
            return Err(invalid("registry and repository must not be empty"));
        }
        if tag.is_none() && digest.is_none() {
            return Err(invalid("either a tag or a digest is required"));
        }

        Ok(Self {
            scheme: DEFAULT_SCHEME.to_string(),
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Returns a copy of this reference using the given URL scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Returns a reference to another tag of the same repository.
    #[must_use]
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            scheme: self.scheme.clone(),
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Some(tag.into()),
            digest: None,
        }
    }

    /// URL scheme (`https` unless configured otherwise).
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Registry host, e.g. `registry.example.com`.
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path, e.g. `bundles/app`.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag, if present.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Digest including its algorithm prefix, if present.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The tag if present, otherwise the digest.
    #[must_use]
    pub fn tag_or_digest(&self) -> &str {
        self.tag
            .as_deref()
            .or(self.digest.as_deref())
            .unwrap_or_default()
    }

    /// `{scheme}://{registry}/v2/{repository}`.
    #[must_use]
    pub fn repository_url(&self) -> String {
        format!("{}://{}/v2/{}", self.scheme, self.registry, self.repository)
    }

    /// Manifest URL for the tag, or the digest when no tag is present.
    #[must_use]
    pub fn manifest_url(&self) -> String {
        self.manifest_url_for(self.tag_or_digest())
    }

    /// Manifest URL for an arbitrary tag or digest of this repository.
    #[must_use]
    pub fn manifest_url_for(&self, tag_or_digest: &str) -> String {
        format!("{}/manifests/{tag_or_digest}", self.repository_url())
    }

    /// Tag list URL of this repository.
    #[must_use]
    pub fn tags_url(&self) -> String {
        format!("{}/tags/list/", self.repository_url())
    }
}

impl FromStr for Reference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
