//! Settings resolution.
//!
//! Flags and `CNAB_*` environment variables win over the YAML config file,
//! which wins over built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cnabtool_registry::{
    RegistryAuth, RegistryConfig, TlsConfig, DEFAULT_SCHEME, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
};
use serde::Deserialize;

use crate::commands::GlobalArgs;

/// Config file name looked up in the search directories.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Verbosity levels.
pub mod verbosity {
    /// No output, exit code only.
    pub const QUIET: u8 = 0;
    /// Errors only.
    pub const ERROR: u8 = 1;
    /// Reports and errors.
    pub const NORMAL: u8 = 2;
    /// Progress messages.
    pub const INFO: u8 = 3;
    /// Everything.
    pub const DEBUG: u8 = 4;
}

/// Contents of the config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    /// Log level verbosity.
    pub verbosity: Option<u8>,
    /// Request timeout in milliseconds.
    pub timeout: Option<u64>,
    /// Skip TLS verification.
    pub unsecure: Option<bool>,
    /// User-Agent.
    pub client: Option<String>,
    /// URL scheme.
    pub scheme: Option<String>,
    /// Registry credentials.
    pub credentials: FileCredentials,
    /// Additional CA certificate.
    pub ca_cert: Option<PathBuf>,
}

/// `credentials` section of the config file.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileCredentials {
    /// User name.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
}

impl std::fmt::Debug for FileCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "*******"))
            .finish()
    }
}

impl FileSettings {
    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Effective settings of one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Log level verbosity.
    pub verbosity: u8,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Skip TLS verification.
    pub unsecure: bool,
    /// User-Agent.
    pub client: String,
    /// URL scheme.
    pub scheme: String,
    /// Registry authentication.
    pub auth: RegistryAuth,
    /// Additional CA certificate.
    pub ca_cert: Option<PathBuf>,
    /// Config file the settings were read from.
    pub source: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verbosity: verbosity::NORMAL,
            timeout: DEFAULT_TIMEOUT,
            unsecure: false,
            client: DEFAULT_USER_AGENT.to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
            auth: RegistryAuth::None,
            ca_cert: None,
            source: None,
        }
    }
}

impl Settings {
    /// Resolves settings from arguments and the config file they point to.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit config file does not exist, a config
    /// file is invalid, or credentials are incomplete.
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let source = find_config(args.config.as_deref(), &search_paths())?;
        let file = match &source {
            Some(path) => FileSettings::from_file(path)?,
            None => FileSettings::default(),
        };

        let mut settings = Self::merge(args, file)?;
        settings.source = source;
        Ok(settings)
    }

    /// Applies arguments over file values over defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if only one of user name and password is set.
    pub fn merge(args: &GlobalArgs, file: FileSettings) -> Result<Self> {
        let defaults = Self::default();

        let username = args.username.clone().or(file.credentials.username);
        let password = args.password.clone().or(file.credentials.password);
        let auth = match (username, password) {
            (Some(username), Some(password)) => RegistryAuth::Basic { username, password },
            (None, None) => RegistryAuth::None,
            _ => bail!("Both username and password are required for basic authentication"),
        };

        Ok(Self {
            verbosity: args.verbosity.or(file.verbosity).unwrap_or(defaults.verbosity),
            timeout: args
                .timeout
                .or(file.timeout)
                .map_or(defaults.timeout, Duration::from_millis),
            unsecure: args.unsecure || file.unsecure.unwrap_or(defaults.unsecure),
            client: args.client.clone().or(file.client).unwrap_or(defaults.client),
            scheme: args.scheme.clone().or(file.scheme).unwrap_or(defaults.scheme),
            auth,
            ca_cert: args.ca_cert.clone().or(file.ca_cert),
            source: None,
        })
    }

    /// Registry-side configuration.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::new()
            .with_scheme(&self.scheme)
            .with_user_agent(&self.client)
            .with_timeout(self.timeout)
            .with_auth(self.auth.clone());

        if self.unsecure || self.ca_cert.is_some() {
            let mut tls = TlsConfig::new();
            if let Some(ref ca_cert) = self.ca_cert {
                tls = tls.with_ca_cert(ca_cert);
            }
            if self.unsecure {
                tls = tls.insecure();
            }
            config = config.with_tls(tls);
        }
        config
    }

    /// Returns true if reports should be printed.
    #[must_use]
    pub const fn shows_reports(&self) -> bool {
        self.verbosity >= verbosity::NORMAL
    }

    /// Returns true if debug output is enabled.
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        self.verbosity >= verbosity::DEBUG
    }

    /// Log filter directive for the current verbosity.
    #[must_use]
    pub fn log_filter(&self) -> String {
        let level = match self.verbosity {
            verbosity::QUIET => return "off".to_string(),
            verbosity::ERROR => "error",
            verbosity::NORMAL => "warn",
            verbosity::INFO => "info",
            _ => "debug",
        };
        format!("cnabtool={level},cnabtool_registry={level},cnabtool_content={level}")
    }
}

/// Default config file locations, in lookup order.
fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/cnabtool").join(CONFIG_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".cnabtool").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(".").join(CONFIG_FILE_NAME));
    paths
}

/// Picks the config file: an explicit path must exist, otherwise the first
/// existing candidate is used, if any.
fn find_config(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(candidates.iter().find(|path| path.is_file()).cloned())
}
