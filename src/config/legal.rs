use std::path::{Component, PathBuf};
use std::time::Duration;

use crate::config::helpers::{
    optional_env, parse_bool_env, parse_csv, parse_string_env, parse_u64_env,
};
use crate::error::ConfigError;
use crate::settings::Settings;

/// What happens to a finding whose highlight text only exists inside redacted spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HiddenFindingPolicy {
    /// Listed, counted in metrics and validatable, just not highlighted.
    #[default]
    Count,
    /// Left out of metrics; validation toggles are refused.
    Exclude,
}

impl HiddenFindingPolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "exclude" => Ok(Self::Exclude),
            other => Err(ConfigError::InvalidValue {
                key: "LEXAI_HIDDEN_FINDING_POLICY".to_string(),
                message: format!("unsupported policy '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Exclude => "exclude",
        }
    }
}

/// Privacy redaction controls.
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub entities: Vec<String>,
    pub hidden_finding_policy: HiddenFindingPolicy,
}

/// Analysis lifecycle controls.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Minimum time the analyzing state stays visible.
    pub min_processing: Duration,
}

/// Audit trail controls.
#[derive(Debug, Clone)]
pub struct AuditLogConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub hash_chain: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        let settings = crate::settings::RedactionSettings::default();
        Self {
            enabled: settings.enabled,
            entities: settings.entities,
            hidden_finding_policy: HiddenFindingPolicy::Count,
        }
    }
}

/// Any `.jsonl` path without `..` components.
fn audit_log_path(raw: &str) -> Result<PathBuf, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "LEXAI_AUDIT_PATH".to_string(),
        message: message.to_string(),
    };

    let path = PathBuf::from(raw.trim());
    if path.as_os_str().is_empty() {
        return Err(invalid("audit log path must not be empty"));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(invalid("audit log path must not contain '..'"));
    }
    if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
        return Err(invalid("audit log must be a .jsonl file"));
    }
    Ok(path)
}

impl RedactionConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let entities = match optional_env("LEXAI_REDACTION_ENTITIES")? {
            Some(raw) => parse_csv(&raw),
            None => settings
                .redaction
                .entities
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        };
        let policy_raw = parse_string_env(
            "LEXAI_HIDDEN_FINDING_POLICY",
            settings.redaction.hidden_finding_policy.clone(),
        )?;

        Ok(Self {
            enabled: parse_bool_env("LEXAI_REDACTION_ENABLED", settings.redaction.enabled)?,
            entities,
            hidden_finding_policy: HiddenFindingPolicy::parse(&policy_raw)?,
        })
    }
}

impl AnalysisConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let ms = parse_u64_env("LEXAI_MIN_ANALYSIS_MS", settings.analysis.min_processing_ms)?;
        Ok(Self {
            min_processing: Duration::from_millis(ms),
        })
    }
}

impl AuditLogConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_bool_env("LEXAI_AUDIT_ENABLED", settings.audit.enabled)?,
            path: audit_log_path(&parse_string_env(
                "LEXAI_AUDIT_PATH",
                settings.audit.path.clone(),
            )?)?,
            hash_chain: parse_bool_env("LEXAI_AUDIT_HASH_CHAIN", settings.audit.hash_chain)?,
        })
    }
}
