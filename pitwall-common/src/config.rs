//! Configuration loading
//!
//! Each setting is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! resolution continues with environment variables and defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Environment variable: backend base URL
pub const ENV_API_URL: &str = "PITWALL_API_URL";
/// Environment variable: credential store document path
pub const ENV_STORE_PATH: &str = "PITWALL_STORE_PATH";
/// Environment variable: provider-issued session document path
pub const ENV_FEDERATED_SESSION: &str = "PITWALL_FEDERATED_SESSION";
/// Environment variable: per-request timeout in milliseconds
pub const ENV_TIMEOUT_MS: &str = "PITWALL_TIMEOUT_MS";
/// Environment variable: log level
pub const ENV_LOG_LEVEL: &str = "PITWALL_LOG_LEVEL";

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// Contents of `config.toml`; every field optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TomlConfig {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub federated_session_path: Option<PathBuf>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub store_path: Option<PathBuf>,
    pub federated_session_path: Option<PathBuf>,
    pub request_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
    /// Explicit config file; skips the platform search
    pub config_file: Option<PathBuf>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash
    pub api_url: String,
    /// Credential store document
    pub store_path: PathBuf,
    /// Provider-issued session document, if federated sign-in is configured
    pub federated_session_path: Option<PathBuf>,
    /// Bound on every backend call
    pub request_timeout: Duration,
    /// Delay before the single retry of a network-level failure
    pub retry_backoff: Duration,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            store_path: default_store_path(),
            federated_session_path: None,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Resolve using the process environment and the platform config file
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let toml_config = match &cli.config_file {
            Some(path) => TomlConfig::load(path)?,
            None => load_platform_toml(),
        };
        Self::resolve_with(cli, &toml_config, |key| std::env::var(key).ok())
    }

    /// Resolve from explicit sources
    ///
    /// `env` looks up an environment variable by name.
    pub fn resolve_with(
        cli: &CliOverrides,
        toml_config: &TomlConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();
        let env_nonblank = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_url = cli
            .api_url
            .clone()
            .or_else(|| env_nonblank(ENV_API_URL))
            .or_else(|| toml_config.api_url.clone())
            .unwrap_or(defaults.api_url);
        let api_url = normalize_api_url(&api_url)?;

        let store_path = cli
            .store_path
            .clone()
            .or_else(|| env_nonblank(ENV_STORE_PATH).map(PathBuf::from))
            .or_else(|| toml_config.store_path.clone())
            .unwrap_or(defaults.store_path);

        let federated_session_path = cli
            .federated_session_path
            .clone()
            .or_else(|| env_nonblank(ENV_FEDERATED_SESSION).map(PathBuf::from))
            .or_else(|| toml_config.federated_session_path.clone());

        let env_timeout = match env_nonblank(ENV_TIMEOUT_MS) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("{} must be milliseconds: {}", ENV_TIMEOUT_MS, e))
            })?),
            None => None,
        };
        let timeout_ms = cli
            .request_timeout_ms
            .or(env_timeout)
            .or(toml_config.request_timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(Error::Config("Request timeout must be non-zero".to_string()));
        }

        let retry_backoff = toml_config
            .retry_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_backoff);

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| env_nonblank(ENV_LOG_LEVEL))
            .or_else(|| toml_config.logging.level.clone())
            .unwrap_or(defaults.log_level);

        Ok(Self {
            api_url,
            store_path,
            federated_session_path,
            request_timeout: Duration::from_millis(timeout_ms),
            retry_backoff,
            log_level,
        })
    }
}

fn normalize_api_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::Config(format!(
            "API URL must start with http:// or https://, got '{}'",
            raw
        )));
    }
    Ok(trimmed.to_string())
}

/// Find and parse the platform config file, falling back to defaults
fn load_platform_toml() -> TomlConfig {
    let Some(path) = find_config_file() else {
        debug!("No config file found, using environment and defaults");
        return TomlConfig::default();
    };

    match TomlConfig::load(&path) {
        Ok(config) => {
            debug!(path = %path.display(), "Loaded config file");
            config
        }
        Err(e) => {
            warn!("Ignoring config file {}: {}", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Get configuration file path for the platform
///
/// Linux checks `~/.config/pitwall/config.toml` then `/etc/pitwall/config.toml`.
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("pitwall").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/pitwall/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default location of the credential store
pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pitwall"))
        .unwrap_or_else(|| PathBuf::from("./pitwall_data"))
        .join("session.json")
}
