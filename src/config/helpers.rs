//! Environment override helpers shared by the config sections.

use crate::error::ConfigError;

/// Read an env var, treating unset and blank values as absent.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

pub(crate) fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

pub(crate) fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key)? {
        Some(raw) => parse_bool(key, &raw),
        None => Ok(default),
    }
}

pub(crate) fn parse_string_env(key: &str, default: String) -> Result<String, ConfigError> {
    Ok(optional_env(key)?.unwrap_or(default))
}

pub(crate) fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match optional_env(key)? {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a non-negative integer: {e}"),
            }),
        None => Ok(default),
    }
}

/// Split a comma-separated list, dropping blanks. Case is preserved.
pub(crate) fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_bool, parse_csv};

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("K", "TRUE").expect("bool"));
        assert!(parse_bool("K", " on ").expect("bool"));
        assert!(!parse_bool("K", "0").expect("bool"));
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn parse_csv_trims_and_keeps_case() {
        assert_eq!(
            parse_csv(" Acme Ltda, ,Global Logistics SA,"),
            vec!["Acme Ltda".to_string(), "Global Logistics SA".to_string()]
        );
    }
}
