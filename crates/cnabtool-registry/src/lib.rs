//! # cnabtool registry
//!
//! Minimal OCI registry client used to inspect and tear down CNAB bundles.
//!
//! This is deliberately not a general registry library. It offers the three
//! operations the CNAB tooling needs:
//!
//! - **Tag list**: `GET /v2/<repository>/tags/list/`
//! - **Manifest with media negotiation**: `GET /v2/<repository>/manifests/<tag|digest>`,
//!   cycling the `Accept` header through a fixed candidate list
//! - **Delete**: `DELETE /v2/<repository>/manifests/<digest>`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cnabtool_registry::{RegistryAuth, RegistryClient, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig::new().with_auth(RegistryAuth::basic("user", "secret"));
//!     let client = RegistryClient::connect(&config, "registry.example.com/bundles/app:v1")?;
//!
//!     let response = client.get_manifest().await?;
//!     println!("{} {}", response.media, response.digest);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               RegistryClient                 │
//! │  ┌───────────┐   ┌─────────────────────────┐ │
//! │  │ Reference │   │    ManifestFetcher      │ │
//! │  │ (parser)  │   │  (media negotiation)    │ │
//! │  └───────────┘   └────────────┬────────────┘ │
//! └───────────────────────────────┼──────────────┘
//!                                 ▼
//!                      Transport (HttpTransport)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod fetcher;
mod oci;
mod reference;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::RegistryClient;
pub use config::{RegistryAuth, RegistryConfig, TlsConfig, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
pub use error::RegistryError;
pub use fetcher::ManifestFetcher;
pub use oci::{annotations, Descriptor, MediaType, TagList};
pub use reference::{Reference, DEFAULT_SCHEME};
pub use transport::{
    compute_digest, CappedBody, HttpTransport, RawResponse, RegistryResponse, Transport,
    MAX_BODY_SIZE,
};
