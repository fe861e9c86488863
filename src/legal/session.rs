use std::collections::HashSet;

use serde::Serialize;

use crate::config::HiddenFindingPolicy;
use crate::error::{CollaboratorError, RegistryError};
use crate::legal::analysis::{AnalysisOrchestrator, AnalysisTicket, Completion};
use crate::legal::document::{ContractDocument, DocumentStatus};
use crate::legal::overlay::{self, AnnotatedText};
use crate::legal::redaction::{RedactionReport, Redactor};
use crate::legal::risk::{RiskFinding, RiskLevel, RiskMetrics, RiskRegistry};
use crate::llm::ExtractionResponse;

/// Active document plus its redacted rendition, computed once on load.
#[derive(Debug, Clone)]
struct LoadedDocument {
    document: ContractDocument,
    redacted: String,
    redaction: RedactionReport,
}

/// Document text ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    pub document_id: String,
    pub privacy_mode: bool,
    pub annotated: AnnotatedText,
    /// Findings present in the contract but masked by redaction.
    pub hidden: Vec<String>,
    #[serde(skip)]
    pub redaction: RedactionReport,
}

/// Headline figures for the risk panel.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub document_id: String,
    pub document_name: String,
    pub status: DocumentStatus,
    pub level: RiskLevel,
    pub metrics: RiskMetrics,
    pub parties: Vec<String>,
    pub value: String,
    pub jurisdiction: String,
    pub expiry_date: String,
    pub summary: Option<String>,
    pub findings: Vec<RiskFinding>,
    pub hidden: Vec<String>,
}

/// Owned state of one audit session. A document switch resets findings,
/// selection and the analysis binding in one step.
pub struct SessionState {
    redactor: Redactor,
    hidden_policy: HiddenFindingPolicy,
    privacy_mode: bool,
    document: Option<LoadedDocument>,
    registry: RiskRegistry,
    analysis: AnalysisOrchestrator,
    selected_highlight: Option<String>,
}

impl SessionState {
    pub fn new(redactor: Redactor, hidden_policy: HiddenFindingPolicy, privacy_mode: bool) -> Self {
        Self {
            redactor,
            hidden_policy,
            privacy_mode,
            document: None,
            registry: RiskRegistry::new(),
            analysis: AnalysisOrchestrator::new(),
            selected_highlight: None,
        }
    }

    pub fn document(&self) -> Option<&ContractDocument> {
        self.document.as_ref().map(|d| &d.document)
    }

    pub fn findings(&self) -> &[RiskFinding] {
        self.registry.list()
    }

    pub fn status(&self) -> Option<DocumentStatus> {
        self.document
            .as_ref()
            .map(|_| self.analysis.state().document_status())
    }

    pub fn selected_highlight(&self) -> Option<&str> {
        self.selected_highlight.as_deref()
    }

    pub fn privacy_mode(&self) -> bool {
        self.privacy_mode
    }

    /// Make `document` active and start its analysis. Findings and selection
    /// of the previous document are dropped.
    pub fn load_document(&mut self, document: ContractDocument) -> AnalysisTicket {
        let (redacted, redaction) = self.redactor.redact_with_report(document.content());
        let ticket = self.analysis.begin(document.id(), &mut self.registry);
        self.selected_highlight = None;
        self.document = Some(LoadedDocument {
            document,
            redacted,
            redaction,
        });
        ticket
    }

    /// Start a new analysis of the active document, if any.
    pub fn request_reanalysis(&mut self) -> Option<AnalysisTicket> {
        let id = self.document.as_ref()?.document.id().to_string();
        self.selected_highlight = None;
        Some(self.analysis.begin(&id, &mut self.registry))
    }

    pub fn close_document(&mut self) {
        self.analysis.reset(&mut self.registry);
        self.selected_highlight = None;
        self.document = None;
    }

    /// Content to send for extraction, only while `ticket` is still current.
    pub fn content_for(&self, ticket: &AnalysisTicket) -> Option<String> {
        if !self.analysis.is_current(ticket) {
            return None;
        }
        self.document
            .as_ref()
            .filter(|d| d.document.id() == ticket.document_id())
            .map(|d| d.document.content().to_string())
    }

    pub fn complete_analysis(
        &mut self,
        ticket: &AnalysisTicket,
        result: Result<ExtractionResponse, CollaboratorError>,
    ) -> Completion {
        self.analysis.complete(ticket, result, &mut self.registry)
    }

    pub fn summary(&self) -> Option<&str> {
        self.analysis.summary()
    }

    pub fn set_privacy_mode(&mut self, enabled: bool) {
        self.privacy_mode = enabled;
    }

    pub fn select_highlight(&mut self, highlight: Option<String>) {
        self.selected_highlight = highlight;
    }

    /// Select the highlight text of finding `id`.
    pub fn select_finding(&mut self, id: &str) -> Result<(), RegistryError> {
        let finding = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.selected_highlight = Some(finding.highlight_text.clone());
        Ok(())
    }

    /// Findings whose highlight text occurs in the raw contract but not in
    /// its redacted form. Empty when privacy mode is off.
    pub fn hidden_findings(&self) -> Vec<String> {
        let Some(loaded) = self.document.as_ref().filter(|_| self.privacy_mode) else {
            return Vec::new();
        };
        self.registry
            .list()
            .iter()
            .filter(|f| {
                overlay::occurs_in(loaded.document.content(), &f.highlight_text)
                    && !overlay::occurs_in(&loaded.redacted, &f.highlight_text)
            })
            .map(|f| f.id().to_string())
            .collect()
    }

    pub fn toggle_validated(&mut self, id: &str) -> Result<bool, RegistryError> {
        if self.hidden_policy == HiddenFindingPolicy::Exclude
            && self.registry.get(id).is_some()
            && self.hidden_findings().iter().any(|h| h == id)
        {
            return Err(RegistryError::NotHighlightable(id.to_string()));
        }
        self.registry.toggle_validated(id)
    }

    pub fn metrics(&self) -> RiskMetrics {
        match self.hidden_policy {
            HiddenFindingPolicy::Count => self.registry.metrics(),
            HiddenFindingPolicy::Exclude => {
                let hidden: HashSet<String> = self.hidden_findings().into_iter().collect();
                self.registry.metrics_excluding(&hidden)
            }
        }
    }

    pub fn render(&self) -> Option<RenderedDocument> {
        let loaded = self.document.as_ref()?;
        let (text, redaction) = if self.privacy_mode {
            (loaded.redacted.as_str(), loaded.redaction.clone())
        } else {
            (loaded.document.content(), RedactionReport::default())
        };

        Some(RenderedDocument {
            document_id: loaded.document.id().to_string(),
            privacy_mode: self.privacy_mode,
            annotated: overlay::annotate(
                text,
                self.registry.list(),
                self.selected_highlight.as_deref(),
            ),
            hidden: self.hidden_findings(),
            redaction,
        })
    }

    pub fn dashboard(&self) -> Option<Dashboard> {
        let loaded = self.document.as_ref()?;
        let metrics = self.metrics();
        let document = &loaded.document;
        Some(Dashboard {
            document_id: document.id().to_string(),
            document_name: document.name.clone(),
            status: self.analysis.state().document_status(),
            level: metrics.level(),
            metrics,
            parties: document.parties.clone(),
            value: document.value.clone(),
            jurisdiction: document.jurisdiction.clone(),
            expiry_date: document.expiry_date.clone(),
            summary: self.analysis.summary().map(str::to_string),
            findings: self.registry.list().to_vec(),
            hidden: self.hidden_findings(),
        })
    }
}
