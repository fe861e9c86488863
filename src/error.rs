//! Error types for the audit engine.
//!
//! Redaction and highlight overlay are total and have no error type. Every
//! fallible boundary (configuration, ingestion, collaborators, registry and
//! chat) gets its own enum so callers can match on what actually went wrong.

use std::path::PathBuf;

/// Configuration resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read settings file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse settings file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Document ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read document {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("document {path} is not UTF-8 text; only plain-text contracts are supported")]
    NotText { path: PathBuf },

    #[error("document is empty")]
    Empty,
}

/// Failure of an external collaborator (risk extraction or chat assistant).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("service returned an empty response")]
    EmptyResponse,

    #[error("service is not configured: {0}")]
    NotConfigured(String),
}

/// Operations on the risk registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("risk finding '{0}' not found")]
    NotFound(String),

    #[error("risk finding '{0}' is hidden by redaction and cannot be validated")]
    NotHighlightable(String),
}

/// Chat send failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("invalid chat message: {0}")]
    Validation(String),

    #[error("a reply is already pending for this session")]
    Busy,

    #[error("assistant unavailable: {0}")]
    Collaborator(#[from] CollaboratorError),
}

/// Audit trail storage and verification errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("audit log line {line} is not a valid record: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("audit chain broken at line {line}: {reason}")]
    BrokenChain { line: usize, reason: String },
}

/// Neutral text shown to the user in place of an assistant reply.
pub const CHAT_FALLBACK_MESSAGE: &str =
    "Sorry, I had a problem processing your question. Please try again.";

/// Neutral text shown when risk extraction fails.
pub const ANALYSIS_FALLBACK_MESSAGE: &str =
    "Could not reach the AI engine. The contract was not analyzed.";

impl ChatError {
    /// User-safe description of the failure; never exposes collaborator internals.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Validation(_) => "Type a question before sending.",
            Self::Busy => "Still waiting for the previous answer.",
            Self::Collaborator(_) => CHAT_FALLBACK_MESSAGE,
        }
    }
}
