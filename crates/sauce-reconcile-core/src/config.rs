//! Publisher configuration (`sauce-reconcile.toml`).
//!
//! ```toml
//! visibility = "team"
//! disable_usage_stats = false
//!
//! [rest]
//! endpoint = "https://api.eu-central-1.saucelabs.com/"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Every key is optional. Credentials are normally supplied through
//! `SAUCE_USERNAME` / `SAUCE_ACCESS_KEY` rather than the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, Result};
use crate::job_record::JobVisibility;
use crate::logging::LogConfig;

/// Environment variable overriding the REST endpoint.
pub const REST_ENDPOINT_ENV: &str = "SAUCE_REST_ENDPOINT";

/// Environment variable pointing at a config file.
pub const CONFIG_PATH_ENV: &str = "SAUCE_RECONCILE_CONFIG";

/// Endpoint used when neither config nor environment name one.
pub const DEFAULT_REST_ENDPOINT: &str = "https://saucelabs.com/";

const CONFIG_FILE_NAME: &str = "sauce-reconcile.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Visibility applied to every job on every pass; `None` leaves the
    /// service default untouched.
    #[serde(
        deserialize_with = "deserialize_visibility",
        skip_serializing_if = "Option::is_none"
    )]
    pub visibility: Option<JobVisibility>,
    /// Skip attaching failure stack traces to failed jobs.
    pub disable_usage_stats: bool,
    pub rest: RestConfig,
    pub logging: LogConfig,
}

/// Remote service connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub access_key: Option<String>,
}

impl RestConfig {
    /// Endpoint resolution: explicit value, then `SAUCE_REST_ENDPOINT`,
    /// then the public default.
    #[must_use]
    pub fn resolved_endpoint(&self) -> String {
        self.resolved_endpoint_with(std::env::var(REST_ENDPOINT_ENV).ok())
    }

    fn resolved_endpoint_with(&self, env_value: Option<String>) -> String {
        self.endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| env_value.filter(|e| !e.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_REST_ENDPOINT.to_string())
    }
}

fn deserialize_visibility<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<JobVisibility>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    JobVisibility::parse_optional(&raw).map_err(serde::de::Error::custom)
}

impl PublisherConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()).into())
    }

    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Load from an explicit path, or from the first discovered config
    /// file, or fall back to defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match resolve_config_path() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading discovered config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Immutable per-invocation options for the engine.
    #[must_use]
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            visibility: self.visibility,
            disable_usage_stats: self.disable_usage_stats,
        }
    }
}

/// Config file discovery order: `SAUCE_RECONCILE_CONFIG`, then
/// `./sauce-reconcile.toml`, then the user config directory.
#[must_use]
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("sauce-reconcile").join("config.toml"))
        .filter(|path| path.exists())
}

/// Options the reconciliation engine reads; fixed for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub visibility: Option<JobVisibility>,
    pub disable_usage_stats: bool,
}
