//! Resolved runtime configuration.
//!
//! `Settings` is what lives on disk; `Config` is what the engine runs with,
//! after environment overrides and validation.

pub(crate) mod helpers;
mod legal;
mod llm;

pub use legal::{AnalysisConfig, AuditLogConfig, HiddenFindingPolicy, RedactionConfig};
pub use llm::LlmConfig;

use crate::error::ConfigError;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct Config {
    pub redaction: RedactionConfig,
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
    pub audit: AuditLogConfig,
}

impl Config {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            redaction: RedactionConfig::resolve(settings)?,
            analysis: AnalysisConfig::resolve(settings)?,
            llm: LlmConfig::resolve(settings)?,
            audit: AuditLogConfig::resolve(settings)?,
        })
    }
}
