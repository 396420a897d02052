//! Runtime configuration.
//!
//! Built once at startup from [`Settings`] plus environment overrides and then
//! passed by reference to every component that needs it.

pub(crate) mod helpers;
mod store;
mod workflows;

pub use self::store::StoreConfig;
pub use self::workflows::WorkflowConfig;

use secrecy::ExposeSecret;

use crate::error::ConfigError;
use crate::settings::Settings;
use crate::workflows::WorkflowKind;

/// A configuration gap that degrades, but does not block, the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub workflows: WorkflowConfig,
}

impl Config {
    /// Resolve settings with environment overrides. Call `dotenvy::dotenv()`
    /// beforehand if `.env` files should participate.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            store: StoreConfig::resolve(settings)?,
            workflows: WorkflowConfig::resolve(settings)?,
        })
    }

    /// Missing settings, in display order. Empty when fully configured.
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.store.url.is_none() {
            warnings.push(ConfigWarning {
                key: "SUPABASE_URL",
                message: "store URL is not set; leads cannot be loaded".to_string(),
            });
        }
        if self
            .store
            .anon_key
            .as_ref()
            .is_none_or(|k| k.expose_secret().is_empty())
        {
            warnings.push(ConfigWarning {
                key: "SUPABASE_ANON_KEY",
                message: "store access key is not set; leads cannot be loaded".to_string(),
            });
        }
        for kind in WorkflowKind::ALL {
            if self.workflows.endpoint(kind).is_none() {
                warnings.push(ConfigWarning {
                    key: kind.env_key(),
                    message: format!("{} webhook is not set; that trigger will fail", kind.label()),
                });
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use url::Url;

    use super::{Config, StoreConfig, WorkflowConfig};

    fn store(url: Option<&str>, key: Option<&str>) -> StoreConfig {
        StoreConfig {
            url: url.map(|u| Url::parse(u).expect("url")),
            anon_key: key.map(|k| SecretString::from(k.to_string())),
            table: "dcf_leads".to_string(),
            transcript_bucket: "dcf_transcript".to_string(),
            fetch_limit: 100,
        }
    }

    #[test]
    fn fully_configured_has_no_warnings() {
        let config = Config {
            store: store(Some("https://demo.supabase.co"), Some("anon")),
            workflows: WorkflowConfig {
                lead_magnet: Some(Url::parse("https://hooks.test/lm").expect("url")),
                discovery_call: Some(Url::parse("https://hooks.test/dc").expect("url")),
                proposal: Some(Url::parse("https://hooks.test/pr").expect("url")),
            },
        };
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn each_missing_setting_is_reported_once() {
        let config = Config {
            store: store(None, None),
            workflows: WorkflowConfig {
                proposal: Some(Url::parse("https://hooks.test/pr").expect("url")),
                ..WorkflowConfig::default()
            },
        };
        let keys: Vec<_> = config.warnings().iter().map(|w| w.key).collect();
        assert_eq!(
            keys,
            vec![
                "SUPABASE_URL",
                "SUPABASE_ANON_KEY",
                "N8N_WEBHOOK_LEAD_MAGNET",
                "N8N_WEBHOOK_DISCOVERY_CALL",
            ]
        );
    }
}
