//! HTTP transport and response decoding.
//!
//! The [`Transport`] trait is the seam between the manifest logic and the
//! network: [`HttpTransport`] talks to a real registry, tests substitute a
//! scripted implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{RegistryAuth, RegistryConfig};
use crate::error::RegistryError;
use crate::oci::MediaType;

/// Maximum number of body bytes read from any response.
///
/// Indexes and manifests are small and layers are never fetched, so a
/// truncated body is accepted as is.
pub const MAX_BODY_SIZE: usize = 8096;

/// Header carrying the registry-computed content digest.
pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Undecoded HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body, at most [`MAX_BODY_SIZE`] bytes.
    pub body: Vec<u8>,
    /// Whether the body was cut at [`MAX_BODY_SIZE`].
    pub truncated: bool,
}

/// Issues registry requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a GET with the given `Accept` media type.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Network`] on connection-level failures.
    async fn get(&self, url: &str, accept: &str) -> Result<RawResponse, RegistryError>;

    /// Issues a DELETE.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Network`] on connection-level failures.
    async fn delete(&self, url: &str) -> Result<RawResponse, RegistryError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    auth_headers: HeaderMap,
}

impl HttpTransport {
    /// Creates a transport from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be encoded, the CA
    /// certificate cannot be read, or the HTTP client cannot be built.
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        Ok(Self {
            http: Self::build_http_client(config)?,
            auth_headers: Self::auth_headers(&config.auth)?,
        })
    }

    /// Builds the HTTP client. `gzip`/`deflate` support makes reqwest send
    /// `Accept-Encoding: gzip, deflate` and decode transparently.
    fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        if let Some(ref tls) = config.tls {
            if tls.insecure_skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::Io {
                    path: ca_cert.clone(),
                    source: e,
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::InvalidConfig {
                        message: format!("Invalid CA certificate: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        builder.build().map_err(|e| RegistryError::InvalidConfig {
            message: format!("Failed to build HTTP client: {e}"),
        })
    }

    fn auth_headers(auth: &RegistryAuth) -> Result<HeaderMap, RegistryError> {
        let mut headers = HeaderMap::new();

        if let RegistryAuth::Basic { username, password } = auth {
            let credentials = base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                format!("{username}:{password}"),
            );
            let mut value = HeaderValue::from_str(&format!("Basic {credentials}")).map_err(
                |_| RegistryError::Authentication {
                    message: "Invalid credentials".to_string(),
                },
            )?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    async fn finish(url: &str, response: reqwest::Response) -> Result<RawResponse, RegistryError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let (body, truncated) = read_capped(url, response).await?;

        tracing::debug!(url, status, bytes = body.len(), truncated, "Registry response");

        Ok(RawResponse {
            status,
            headers,
            body,
            truncated,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, accept: &str) -> Result<RawResponse, RegistryError> {
        tracing::debug!(url, accept, "GET");

        let response = self
            .http
            .get(url)
            .headers(self.auth_headers.clone())
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| RegistryError::network(url, e))?;

        Self::finish(url, response).await
    }

    async fn delete(&self, url: &str) -> Result<RawResponse, RegistryError> {
        tracing::debug!(url, "DELETE");

        let response = self
            .http
            .delete(url)
            .headers(self.auth_headers.clone())
            .send()
            .await
            .map_err(|e| RegistryError::network(url, e))?;

        Self::finish(url, response).await
    }
}

/// Reads the body up to [`MAX_BODY_SIZE`] bytes.
async fn read_capped(
    url: &str,
    mut response: reqwest::Response,
) -> Result<(Vec<u8>, bool), RegistryError> {
    let mut body = CappedBody::default();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| RegistryError::network(url, e))?
    {
        if !body.push(&chunk) {
            break;
        }
    }

    Ok(body.into_parts())
}

/// Body buffer that keeps at most [`MAX_BODY_SIZE`] bytes.
#[derive(Debug, Default)]
pub struct CappedBody {
    body: Vec<u8>,
    truncated: bool,
}

impl CappedBody {
    /// Collects chunks until the cap is reached.
    #[must_use]
    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let mut body = Self::default();
        for chunk in chunks {
            if !body.push(chunk.as_ref()) {
                break;
            }
        }
        body
    }

    /// Appends a chunk. Returns false once bytes had to be dropped.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let room = MAX_BODY_SIZE - self.body.len();
        if chunk.len() > room {
            self.body.extend_from_slice(&chunk[..room]);
            self.truncated = true;
            return false;
        }
        self.body.extend_from_slice(chunk);
        true
    }

    /// Body bytes and whether anything was dropped.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, bool) {
        (self.body, self.truncated)
    }
}

/// Decoded registry response envelope.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistryResponse {
    /// Reference the request was made for.
    pub reference: String,
    /// HTTP status code.
    pub status: u16,
    /// File name from `Content-Disposition`, if any.
    pub filename: String,
    /// Numeric `Content-Length`.
    ///
    /// Transparent gzip/deflate decoding strips the header; the size of the
    /// decoded body is reported instead when it was read completely, and 0
    /// when it was truncated.
    pub length: u64,
    /// `Content-Type`, or the requested media type when the header is absent.
    pub media: MediaType,
    /// `Last-Modified`.
    pub date: String,
    /// `Docker-Content-Digest`, or the body hash when the header is absent.
    pub digest: String,
    /// Body text; always valid JSON.
    pub content: String,
}

impl RegistryResponse {
    /// Decodes a raw response.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidJson`] if the body is not valid JSON.
    pub fn decode(
        reference: &str,
        url: &str,
        requested: &str,
        raw: &RawResponse,
    ) -> Result<Self, RegistryError> {
        let header = |name: &str| {
            raw.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        serde_json::from_slice::<serde_json::Value>(&raw.body).map_err(|source| {
            tracing::debug!(
                url,
                status = raw.status,
                body = %String::from_utf8_lossy(&raw.body),
                "Response body is not valid JSON"
            );
            RegistryError::InvalidJson {
                url: url.to_string(),
                status: raw.status,
                source,
            }
        })?;

        let computed = (!raw.truncated).then(|| compute_digest(&raw.body));
        let digest = match (header(DOCKER_CONTENT_DIGEST), computed) {
            (Some(announced), Some(computed)) => {
                if raw.status == 200 && announced != computed {
                    tracing::warn!(
                        url,
                        announced = %announced,
                        computed = %computed,
                        "Registry digest does not match body"
                    );
                }
                announced
            }
            (Some(announced), None) => announced,
            (None, Some(computed)) if raw.status == 200 => computed,
            (None, _) => String::new(),
        };

        Ok(Self {
            reference: reference.to_string(),
            status: raw.status,
            filename: header("content-disposition")
                .as_deref()
                .and_then(disposition_filename)
                .unwrap_or_default(),
            length: header("content-length")
                .and_then(|v| v.trim().parse().ok())
                .or_else(|| u64::try_from(raw.body.len()).ok().filter(|_| !raw.truncated))
                .unwrap_or_default(),
            media: MediaType::new(
                header("content-type").unwrap_or_else(|| requested.to_string()),
            ),
            date: header("last-modified").unwrap_or_default(),
            digest,
            content: String::from_utf8_lossy(&raw.body).into_owned(),
        })
    }

    /// Parses the content as JSON.
    #[must_use]
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.content).ok()
    }

    /// Content re-indented for display, or the raw text if it does not parse.
    #[must_use]
    pub fn pretty_content(&self) -> String {
        self.json()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or_else(|| self.content.clone())
    }
}

/// Extracts the quoted file name following `filename=`.
fn disposition_filename(disposition: &str) -> Option<String> {
    let after = &disposition[disposition.find("filename=")? + "filename=".len()..];
    let start = after.find('"')? + 1;
    let len = after[start..].find('"')?;
    Some(after[start..start + len].to_string())
}

/// Computes the `sha256:` digest of data.
#[must_use]
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
