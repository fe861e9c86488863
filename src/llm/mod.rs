//! Boundaries to the AI collaborators.
//!
//! The engine never talks to a model directly; it goes through
//! [`RiskExtractor`] and [`LegalAssistant`]. [`gemini::GeminiClient`] is the
//! default implementation of both.

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::legal::chat::ChatRole;

/// One risk as reported by the extraction service. Every field is optional on
/// the wire; the analysis orchestrator rejects incomplete entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRisk {
    pub clause: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub highlight_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub risks: Option<Vec<ExtractedRisk>>,
    pub summary: Option<String>,
}

/// A prior chat turn handed to the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Extracts legal risks from contract text.
#[async_trait]
pub trait RiskExtractor: Send + Sync {
    async fn extract(&self, content: &str) -> Result<ExtractionResponse, CollaboratorError>;
}

/// Answers questions about the active contract.
#[async_trait]
pub trait LegalAssistant: Send + Sync {
    async fn reply(
        &self,
        history: &[HistoryTurn],
        message: &str,
        context: &str,
    ) -> Result<String, CollaboratorError>;
}
