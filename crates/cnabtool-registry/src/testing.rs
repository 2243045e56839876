//! Scripted in-memory [`Transport`] for tests.
//!
//! Responses are keyed by method, URL and (for GET) the `Accept` media type.
//! Anything not scripted answers `404` with a registry-style JSON error, and
//! every request is recorded for later assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::RegistryError;
use crate::oci::MediaType;
use crate::transport::{CappedBody, RawResponse, Transport};

const ANY_ACCEPT: &str = "*";

/// A request seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// `GET` or `DELETE`.
    pub method: &'static str,
    /// Request URL.
    pub url: String,
    /// `Accept` media type for GET requests.
    pub accept: Option<String>,
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(RawResponse),
    NetworkFailure,
}

/// Scripted registry stand-in.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: HashMap<(&'static str, String, String), Scripted>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers GET `url` with `Accept: accept`.
    #[must_use]
    pub fn on_get(mut self, url: impl Into<String>, accept: &str, response: RawResponse) -> Self {
        self.routes.insert(
            ("GET", url.into(), accept.to_string()),
            Scripted::Respond(response),
        );
        self
    }

    /// Answers GET `url` whatever the `Accept` header.
    #[must_use]
    pub fn on_get_any(self, url: impl Into<String>, response: RawResponse) -> Self {
        self.on_get(url, ANY_ACCEPT, response)
    }

    /// Answers DELETE `url`.
    #[must_use]
    pub fn on_delete(mut self, url: impl Into<String>, response: RawResponse) -> Self {
        self.routes.insert(
            ("DELETE", url.into(), ANY_ACCEPT.to_string()),
            Scripted::Respond(response),
        );
        self
    }

    /// Fails GET `url` at the connection level.
    #[must_use]
    pub fn fail_get(mut self, url: impl Into<String>) -> Self {
        self.routes.insert(
            ("GET", url.into(), ANY_ACCEPT.to_string()),
            Scripted::NetworkFailure,
        );
        self
    }

    /// Fails DELETE `url` at the connection level.
    #[must_use]
    pub fn fail_delete(mut self, url: impl Into<String>) -> Self {
        self.routes.insert(
            ("DELETE", url.into(), ANY_ACCEPT.to_string()),
            Scripted::NetworkFailure,
        );
        self
    }

    /// Serves a manifest at `url` only when asked for exactly `media_type`,
    /// the way a registry rejects representations it cannot convert to.
    #[must_use]
    pub fn serve_manifest(
        self,
        url: impl Into<String>,
        media_type: &str,
        digest: &str,
        body: &str,
    ) -> Self {
        let response = json_response(200, body)
            .with_header("content-type", media_type)
            .with_header("docker-content-digest", digest);
        self.on_get(url, media_type, response)
    }

    /// Serves a tag list at `url`.
    #[must_use]
    pub fn serve_tags(self, url: impl Into<String>, name: &str, tags: &[&str]) -> Self {
        let body = serde_json::json!({ "name": name, "tags": tags }).to_string();
        self.on_get_any(
            url,
            json_response(200, &body).with_header("content-type", MediaType::JSON),
        )
    }

    /// All requests seen so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the request log mutex was poisoned.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    /// Requests with the given method.
    #[must_use]
    pub fn requests_with(&self, method: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    fn record(&self, method: &'static str, url: &str, accept: Option<&str>) {
        self.requests
            .lock()
            .expect("request log poisoned")
            .push(RecordedRequest {
                method,
                url: url.to_string(),
                accept: accept.map(str::to_string),
            });
    }

    fn answer(&self, method: &'static str, url: &str, accept: &str) -> Result<RawResponse, RegistryError> {
        let exact = self.routes.get(&(method, url.to_string(), accept.to_string()));
        let any = || self.routes.get(&(method, url.to_string(), ANY_ACCEPT.to_string()));

        match exact.or_else(any) {
            Some(Scripted::Respond(response)) => Ok(response.clone()),
            Some(Scripted::NetworkFailure) => Err(RegistryError::network(
                url,
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
            )),
            None => Ok(json_response(
                404,
                r#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#,
            )),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, accept: &str) -> Result<RawResponse, RegistryError> {
        self.record("GET", url, Some(accept));
        self.answer("GET", url, accept)
    }

    async fn delete(&self, url: &str) -> Result<RawResponse, RegistryError> {
        self.record("DELETE", url, None);
        self.answer("DELETE", url, ANY_ACCEPT)
    }
}

/// Builds a response with the given status and body, capped like the real transport.
#[must_use]
pub fn json_response(status: u16, body: &str) -> RawResponse {
    let (body, truncated) = CappedBody::from_chunks([body.as_bytes()]).into_parts();
    RawResponse {
        status,
        headers: HeaderMap::new(),
        body,
        truncated,
    }
}

/// Header helpers for scripted responses.
pub trait RawResponseExt {
    /// Adds a header.
    #[must_use]
    fn with_header(self, name: &'static str, value: &str) -> Self;
}

impl RawResponseExt for RawResponse {
    fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).expect("valid header value"),
        );
        self
    }
}

/// Builds a CNAB index body declaring the given `(digest, media type, role)` entries.
///
/// Roles other than `config` and `invocation` are written as named components.
#[must_use]
pub fn cnab_index(entries: &[(&str, &str, &str)]) -> String {
    let manifests: Vec<_> = entries
        .iter()
        .map(|(digest, media_type, role)| {
            let annotations = match *role {
                "config" | "invocation" => serde_json::json!({ "io.cnab.manifest.type": role }),
                name => serde_json::json!({
                    "io.cnab.manifest.type": "component",
                    "io.cnab.component.name": name,
                }),
            };
            serde_json::json!({
                "mediaType": media_type,
                "digest": digest,
                "size": 512,
                "annotations": annotations,
            })
        })
        .collect();

    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": MediaType::OCI_INDEX,
        "manifests": manifests,
    })
    .to_string()
}
