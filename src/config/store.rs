use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::helpers::{env_or_setting, parse_http_url, parse_string_env, parse_usize_env};
use crate::error::ConfigError;
use crate::settings::Settings;

const MAX_FETCH_LIMIT: usize = 1000;

/// Hosted backend connection (table store, realtime, object storage).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: Option<Url>,
    pub anon_key: Option<SecretString>,
    pub table: String,
    pub transcript_bucket: String,
    pub fetch_limit: usize,
}

fn validate_identifier(key: &str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{trimmed}' may only contain letters, digits, '_' and '-'"),
        });
    }
    Ok(trimmed.to_string())
}

impl StoreConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let url = parse_http_url(
            "SUPABASE_URL",
            env_or_setting("SUPABASE_URL", settings.store.url.as_ref())?,
        )?;
        let anon_key = env_or_setting("SUPABASE_ANON_KEY", settings.store.anon_key.as_ref())?
            .map(SecretString::from);

        let fetch_limit = parse_usize_env("DCF_FETCH_LIMIT", settings.store.fetch_limit)?;
        if fetch_limit == 0 || fetch_limit > MAX_FETCH_LIMIT {
            return Err(ConfigError::InvalidValue {
                key: "DCF_FETCH_LIMIT".to_string(),
                message: format!("must be between 1 and {MAX_FETCH_LIMIT}"),
            });
        }

        Ok(Self {
            url,
            anon_key,
            table: validate_identifier(
                "DCF_LEADS_TABLE",
                &parse_string_env("DCF_LEADS_TABLE", settings.store.table.clone())?,
            )?,
            transcript_bucket: validate_identifier(
                "DCF_TRANSCRIPT_BUCKET",
                &parse_string_env(
                    "DCF_TRANSCRIPT_BUCKET",
                    settings.store.transcript_bucket.clone(),
                )?,
            )?,
            fetch_limit,
        })
    }

    /// Both the URL and the access key are present.
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
            && self
                .anon_key
                .as_ref()
                .is_some_and(|k| !k.expose_secret().is_empty())
    }
}
