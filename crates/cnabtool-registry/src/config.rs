//! Configuration types for the registry client.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::reference::DEFAULT_SCHEME;

/// Client identifier sent as `User-Agent` when none is configured.
pub const DEFAULT_USER_AGENT: &str = "curl/7.79.1";

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration for the registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// URL scheme (`https` or `http`).
    pub scheme: String,

    /// User agent string.
    pub user_agent: String,

    /// Timeout applied to every individual request.
    pub timeout: Duration,

    /// Authentication configuration.
    pub auth: RegistryAuth,

    /// TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConfig {
    /// Creates a configuration with defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use cnabtool_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new();
    /// assert_eq!(config.scheme, "https");
    /// assert_eq!(config.user_agent, "curl/7.79.1");
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            auth: RegistryAuth::None,
            tls: None,
        }
    }

    /// Sets the URL scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the authentication method.
    #[must_use]
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// Authentication methods for registry access.
#[derive(Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    /// Anonymous access.
    None,

    /// HTTP basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },
}

impl RegistryAuth {
    /// Creates basic authentication.
    ///
    /// # Examples
    ///
    /// ```
    /// use cnabtool_registry::RegistryAuth;
    ///
    /// let auth = RegistryAuth::basic("user", "pass");
    /// assert!(!format!("{auth:?}").contains("pass\""));
    /// ```
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"*******")
                .finish(),
        }
    }
}

/// TLS configuration.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Path to an extra CA certificate file (PEM).
    pub ca_cert: Option<PathBuf>,

    /// Whether to skip certificate verification.
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Creates a new TLS configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ca_cert: None,
            insecure_skip_verify: false,
        }
    }

    /// Sets the CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Enables insecure mode (skips certificate verification).
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }
}
