//! Persisted user settings.
//!
//! Settings live in `~/.dcf-leads/settings.toml`. Every value can be
//! overridden from the environment when [`crate::config::Config`] is resolved.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_LEADS_TABLE: &str = "dcf_leads";
pub const DEFAULT_TRANSCRIPT_BUCKET: &str = "dcf_transcript";
pub const DEFAULT_FETCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub workflows: WorkflowSettings,
}

/// Hosted backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub table: String,
    pub transcript_bucket: String,
    pub fetch_limit: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            table: DEFAULT_LEADS_TABLE.to_string(),
            transcript_bucket: DEFAULT_TRANSCRIPT_BUCKET.to_string(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

/// Webhook endpoints for the three automation workflows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub lead_magnet: Option<String>,
    pub discovery_call: Option<String>,
    pub proposal: Option<String>,
}

/// Default settings location: `~/.dcf-leads/settings.toml`.
pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dcf-leads")
        .join("settings.toml")
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError {
            path: origin.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }
}
