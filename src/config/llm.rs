use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::config::helpers::{optional_env, parse_string_env, parse_u64_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Connection settings for the AI collaborator service.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: Url,
    pub request_timeout: Duration,
    /// Absent when no key is configured; analysis then fails with a neutral message.
    pub api_key: Option<SecretString>,
}

fn validate_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: "LEXAI_API_BASE_URL".to_string(),
        message: format!("not a valid URL: {e}"),
    })?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(ConfigError::InvalidValue {
            key: "LEXAI_API_BASE_URL".to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}

impl LlmConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let model = parse_string_env("LEXAI_MODEL", settings.llm.model.clone())?;
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "LEXAI_MODEL".to_string(),
                message: "model name must not be empty".to_string(),
            });
        }

        let timeout_secs = parse_u64_env(
            "LEXAI_REQUEST_TIMEOUT_SECS",
            settings.llm.request_timeout_secs,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEXAI_REQUEST_TIMEOUT_SECS".to_string(),
                message: "timeout must be at least one second".to_string(),
            });
        }

        Ok(Self {
            model: model.trim().to_string(),
            base_url: validate_base_url(&parse_string_env(
                "LEXAI_API_BASE_URL",
                settings.llm.base_url.clone(),
            )?)?,
            request_timeout: Duration::from_secs(timeout_secs),
            api_key: optional_env("GEMINI_API_KEY")?.map(SecretString::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::validate_base_url;

    #[test]
    fn base_url_accepts_https() {
        let url = validate_base_url("https://generativelanguage.googleapis.com").expect("url");
        assert_eq!(url.host_str(), Some("generativelanguage.googleapis.com"));
    }

    #[test]
    fn base_url_rejects_other_schemes() {
        assert!(validate_base_url("ftp://example.com").is_err());
        assert!(validate_base_url("not a url").is_err());
    }
}
