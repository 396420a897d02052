//! Environment lookups shared by the config resolvers.
//!
//! Only `Config::resolve` calls these. Business logic receives the resolved
//! [`crate::config::Config`] and never reads the environment itself.

use url::Url;

use crate::error::ConfigError;

/// Read an environment variable, treating unset and blank as `None`.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

pub(crate) fn parse_string_env(key: &str, default: String) -> Result<String, ConfigError> {
    Ok(optional_env(key)?.unwrap_or(default))
}

pub(crate) fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    optional_env(key)?
        .map(|s| s.parse::<usize>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a positive integer: {e}"),
        })
        .map(|v| v.unwrap_or(default))
}

/// Env value first, then the settings fallback. Blank strings count as unset.
pub(crate) fn env_or_setting(
    key: &str,
    setting: Option<&String>,
) -> Result<Option<String>, ConfigError> {
    Ok(optional_env(key)?.or_else(|| {
        setting
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }))
}

/// Parse an optional http(s) URL setting.
pub(crate) fn parse_http_url(key: &str, raw: Option<String>) -> Result<Option<Url>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("invalid URL '{raw}': {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(Some(url)),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("unsupported URL scheme '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ConfigError;

    use super::parse_http_url;

    #[test]
    fn http_urls_parse() {
        let url = parse_http_url("K", Some("https://demo.supabase.co".to_string()))
            .expect("valid")
            .expect("present");
        assert_eq!(url.host_str(), Some("demo.supabase.co"));
        assert!(parse_http_url("K", None).expect("absent ok").is_none());
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = parse_http_url("N8N_WEBHOOK_PROPOSAL", Some("ftp://x.test/a".to_string()))
            .expect_err("ftp rejected");
        let ConfigError::InvalidValue { key, message } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "N8N_WEBHOOK_PROPOSAL");
        assert!(message.contains("ftp"), "unexpected message: {message}");
    }

    #[test]
    fn garbage_url_is_rejected() {
        assert!(parse_http_url("K", Some("not a url".to_string())).is_err());
    }
}
