//! On-disk settings (`~/.lexai/settings.toml`).
//!
//! Settings are the persisted layer; `Config::resolve` applies environment
//! overrides on top of them. A missing file yields the defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub redaction: RedactionSettings,
    pub analysis: AnalysisSettings,
    pub llm: LlmSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionSettings {
    pub enabled: bool,
    /// Entity names masked verbatim (case-sensitive).
    pub entities: Vec<String>,
    /// `count` or `exclude`.
    pub hidden_finding_policy: String,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            entities: vec!["Global Logistics SA".to_string(), "TechFlow Corp".to_string()],
            hidden_finding_policy: "count".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub min_processing_ms: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            min_processing_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gemini-3-flash-preview".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub enabled: bool,
    pub path: String,
    pub hash_chain: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "logs/lexai_audit.jsonl".to_string(),
            hash_chain: true,
        }
    }
}

impl Settings {
    /// Default settings location, `~/.lexai/settings.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".lexai").join("settings.toml"))
    }

    /// Load settings from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
