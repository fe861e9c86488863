use std::time::Duration;

use tokio::time::Instant;

use crate::error::CollaboratorError;
use crate::legal::document::DocumentStatus;
use crate::legal::risk::{RiskFinding, RiskRegistry, Severity};
use crate::llm::{ExtractedRisk, ExtractionResponse, RiskExtractor};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AnalysisState {
    #[default]
    Idle,
    Analyzing { document_id: String },
    Analyzed { document_id: String },
    Failed { document_id: String, reason: String },
}

impl AnalysisState {
    pub fn document_status(&self) -> DocumentStatus {
        match self {
            Self::Idle => DocumentStatus::Pending,
            Self::Analyzing { .. } => DocumentStatus::Analyzing,
            Self::Analyzed { .. } => DocumentStatus::Analyzed,
            Self::Failed { .. } => DocumentStatus::Failed,
        }
    }
}

/// Binds one extraction request to the document it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTicket {
    document_id: String,
    generation: u64,
    started_at: Instant,
}

impl AnalysisTicket {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// What `complete` did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Analyzed { findings: usize },
    Failed { reason: String },
    /// The ticket no longer matches the active binding; nothing changed.
    Stale,
}

/// Risk-extraction lifecycle for the active document.
///
/// ```text
/// Idle ──begin──▶ Analyzing ──complete(ok)──▶ Analyzed
///                     │      ──complete(err)─▶ Failed
///                     ▲                          │
///                     └────────begin─────────────┘
/// ```
///
/// A completion whose ticket no longer matches the current binding is
/// stale and is dropped without touching state or findings.
#[derive(Debug, Default)]
pub struct AnalysisOrchestrator {
    state: AnalysisState,
    generation: u64,
    summary: Option<String>,
}

fn required(field: Option<&String>, name: &str, idx: usize) -> Result<String, String> {
    match field.map(|s| s.trim()) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(format!("risk #{idx} is missing '{name}'")),
    }
}

fn validate_risk(risk: &ExtractedRisk, idx: usize, generation: u64) -> Result<RiskFinding, String> {
    let clause = required(risk.clause.as_ref(), "clause", idx)?;
    let description = required(risk.description.as_ref(), "description", idx)?;
    let severity_raw = required(risk.severity.as_ref(), "severity", idx)?;
    let severity = Severity::parse(risk.severity.as_deref().unwrap_or_default())
        .ok_or_else(|| format!("risk #{idx} has unsupported severity '{severity_raw}'"))?;
    // Kept verbatim: it must match the contract text exactly.
    let highlight_text = match risk.highlight_text.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => return Err(format!("risk #{idx} is missing 'highlightText'")),
    };

    Ok(RiskFinding::new(
        format!("risk-{idx}-{generation}"),
        clause,
        description,
        severity,
        highlight_text,
    ))
}

/// Turn a collaborator payload into findings, rejecting it as a whole when
/// any entry is incomplete.
fn validate_extraction(
    response: ExtractionResponse,
    generation: u64,
) -> Result<(Vec<RiskFinding>, Option<String>), String> {
    let risks = response
        .risks
        .ok_or_else(|| "response is missing 'risks'".to_string())?;
    let findings = risks
        .iter()
        .enumerate()
        .map(|(idx, risk)| validate_risk(risk, idx, generation))
        .collect::<Result<Vec<_>, _>>()?;
    let summary = response.summary.filter(|s| !s.trim().is_empty());
    Ok((findings, summary))
}

impl AnalysisOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Start a fresh analysis of `document_id`. Findings from any previous run
    /// are discarded immediately.
    pub fn begin(&mut self, document_id: &str, registry: &mut RiskRegistry) -> AnalysisTicket {
        self.generation += 1;
        registry.clear();
        self.summary = None;
        self.state = AnalysisState::Analyzing {
            document_id: document_id.to_string(),
        };
        tracing::debug!(
            document_id,
            generation = self.generation,
            "Analysis started"
        );

        AnalysisTicket {
            document_id: document_id.to_string(),
            generation: self.generation,
            started_at: Instant::now(),
        }
    }

    /// Drop the binding and findings without starting a new analysis.
    pub fn reset(&mut self, registry: &mut RiskRegistry) {
        self.generation += 1;
        registry.clear();
        self.summary = None;
        self.state = AnalysisState::Idle;
    }

    /// True when `ticket` is the request the current state is waiting on.
    pub fn is_current(&self, ticket: &AnalysisTicket) -> bool {
        ticket.generation == self.generation
            && matches!(
                &self.state,
                AnalysisState::Analyzing { document_id } if *document_id == ticket.document_id
            )
    }

    /// Apply the collaborator result for `ticket`.
    pub fn complete(
        &mut self,
        ticket: &AnalysisTicket,
        result: Result<ExtractionResponse, CollaboratorError>,
        registry: &mut RiskRegistry,
    ) -> Completion {
        if !self.is_current(ticket) {
            tracing::warn!(
                document_id = %ticket.document_id,
                generation = ticket.generation,
                "Discarding stale analysis result"
            );
            return Completion::Stale;
        }

        let validated = result
            .map_err(|e| e.to_string())
            .and_then(|response| validate_extraction(response, ticket.generation));

        match validated {
            Ok((findings, summary)) => {
                registry.replace(findings);
                self.summary = summary;
                self.state = AnalysisState::Analyzed {
                    document_id: ticket.document_id.clone(),
                };
                tracing::info!(
                    document_id = %ticket.document_id,
                    findings = registry.len(),
                    "Analysis completed"
                );
                Completion::Analyzed {
                    findings: registry.len(),
                }
            }
            Err(reason) => {
                registry.clear();
                self.summary = None;
                tracing::warn!(
                    document_id = %ticket.document_id,
                    reason = %reason,
                    "Analysis failed"
                );
                self.state = AnalysisState::Failed {
                    document_id: ticket.document_id.clone(),
                    reason: reason.clone(),
                };
                Completion::Failed { reason }
            }
        }
    }
}

/// Call the extractor, but do not return before `floor` has elapsed since
/// the ticket was issued.
pub async fn run_extraction(
    extractor: &dyn RiskExtractor,
    ticket: &AnalysisTicket,
    content: &str,
    floor: Duration,
) -> Result<ExtractionResponse, CollaboratorError> {
    let visible_until = ticket.started_at + floor;
    let (result, ()) = tokio::join!(
        extractor.extract(content),
        tokio::time::sleep_until(visible_until)
    );
    result
}
