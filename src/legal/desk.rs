use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::{Config, HiddenFindingPolicy};
use crate::error::{ChatError, RegistryError};
use crate::legal::analysis::{self, AnalysisTicket, Completion};
use crate::legal::audit::{AuditEvent, AuditTrail, ChatOutcome, SessionCounters};
use crate::legal::chat::{ChatMessage, ChatSession};
use crate::legal::document::ContractDocument;
use crate::legal::redaction::Redactor;
use crate::legal::session::{Dashboard, RenderedDocument, SessionState};
use crate::llm::{LegalAssistant, RiskExtractor};

struct DeskInner {
    session: SessionState,
    chat: Option<Arc<ChatSession>>,
}

/// Async driver for an audit session.
///
/// ```text
/// AuditDesk
/// ├── inner: Mutex<DeskInner>        (never held across a collaborator call)
/// │   ├── session: SessionState      (document, registry, analysis, selection)
/// │   └── chat: Arc<ChatSession>     (replaced on every document switch)
/// ├── extractor: Arc<dyn RiskExtractor>
/// ├── assistant: Arc<dyn LegalAssistant>
/// └── audit: AuditTrail
/// ```
///
/// The staleness check and registry population for a completing extraction
/// happen under the same lock that document switches take.
pub struct AuditDesk {
    inner: Mutex<DeskInner>,
    extractor: Arc<dyn RiskExtractor>,
    assistant: Arc<dyn LegalAssistant>,
    min_processing: Duration,
    audit: AuditTrail,
}

/// Builder-style options for [`AuditDesk::new`].
#[derive(Debug, Clone)]
pub struct DeskOptions {
    pub redactor: Redactor,
    pub hidden_policy: HiddenFindingPolicy,
    pub privacy_mode: bool,
    pub min_processing: Duration,
}

impl DeskOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            redactor: Redactor::from_config(&config.redaction),
            hidden_policy: config.redaction.hidden_finding_policy,
            privacy_mode: config.redaction.enabled,
            min_processing: config.analysis.min_processing,
        }
    }
}

impl Default for DeskOptions {
    fn default() -> Self {
        Self {
            redactor: Redactor::default(),
            hidden_policy: HiddenFindingPolicy::Count,
            privacy_mode: true,
            min_processing: Duration::from_millis(1200),
        }
    }
}

impl AuditDesk {
    pub fn new(
        options: DeskOptions,
        extractor: Arc<dyn RiskExtractor>,
        assistant: Arc<dyn LegalAssistant>,
    ) -> Self {
        Self {
            inner: Mutex::new(DeskInner {
                session: SessionState::new(
                    options.redactor,
                    options.hidden_policy,
                    options.privacy_mode,
                ),
                chat: None,
            }),
            extractor,
            assistant,
            min_processing: options.min_processing,
            audit: AuditTrail::disabled(),
        }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit_counters(&self) -> SessionCounters {
        self.audit.counters()
    }

    /// Switch to `document`: findings, selection and chat history of the
    /// previous document are dropped and a new analysis is bound.
    pub async fn load_document(&self, document: ContractDocument) -> AnalysisTicket {
        let chat = Arc::new(ChatSession::new(
            document.id(),
            document.content(),
            Arc::clone(&self.assistant),
        ));

        let mut inner = self.inner.lock().await;
        let document_id = document.id().to_string();
        let ticket = inner.session.load_document(document);
        inner.chat = Some(chat);
        let redacted = inner
            .session
            .render()
            .map(|r| r.redaction.total())
            .unwrap_or_default();
        drop(inner);

        self.audit.record(AuditEvent::DocumentLoaded {
            document_id,
            redactions: redacted,
        });
        self.record_started(&ticket);
        ticket
    }

    /// Re-run extraction for the active document.
    pub async fn reanalyze(&self) -> Option<AnalysisTicket> {
        let ticket = self.inner.lock().await.session.request_reanalysis()?;
        self.record_started(&ticket);
        Some(ticket)
    }

    fn record_started(&self, ticket: &AnalysisTicket) {
        self.audit.record(AuditEvent::AnalysisStarted {
            document_id: ticket.document_id().to_string(),
            generation: ticket.generation(),
        });
    }

    /// Drive the extraction bound to `ticket` to completion.
    pub async fn run_analysis(&self, ticket: &AnalysisTicket) -> Completion {
        let content = self.inner.lock().await.session.content_for(ticket);
        let completion = match content {
            None => Completion::Stale,
            Some(content) => {
                let result = analysis::run_extraction(
                    self.extractor.as_ref(),
                    ticket,
                    &content,
                    self.min_processing,
                )
                .await;
                self.inner
                    .lock()
                    .await
                    .session
                    .complete_analysis(ticket, result)
            }
        };

        let document_id = ticket.document_id().to_string();
        let generation = ticket.generation();
        self.audit.record(match &completion {
            Completion::Analyzed { findings } => AuditEvent::AnalysisCompleted {
                document_id,
                generation,
                findings: *findings,
            },
            Completion::Failed { .. } => AuditEvent::AnalysisFailed {
                document_id,
                generation,
            },
            Completion::Stale => AuditEvent::AnalysisStale {
                document_id,
                generation,
            },
        });
        completion
    }

    /// Load `document` and wait for its analysis.
    pub async fn open(&self, document: ContractDocument) -> Completion {
        let ticket = self.load_document(document).await;
        self.run_analysis(&ticket).await
    }

    pub async fn close_document(&self) {
        let mut inner = self.inner.lock().await;
        inner.session.close_document();
        inner.chat = None;
    }

    pub async fn toggle_validated(&self, id: &str) -> Result<bool, RegistryError> {
        let mut inner = self.inner.lock().await;
        let validated = inner.session.toggle_validated(id)?;
        let document_id = inner
            .session
            .document()
            .map(|d| d.id().to_string())
            .unwrap_or_default();
        drop(inner);

        self.audit.record(AuditEvent::FindingToggled {
            document_id,
            finding_id: id.to_string(),
            validated,
        });
        Ok(validated)
    }

    pub async fn select_finding(&self, id: &str) -> Result<(), RegistryError> {
        self.inner.lock().await.session.select_finding(id)
    }

    pub async fn select_highlight(&self, highlight: Option<String>) {
        self.inner.lock().await.session.select_highlight(highlight);
    }

    pub async fn set_privacy_mode(&self, enabled: bool) {
        self.inner.lock().await.session.set_privacy_mode(enabled);
    }

    pub async fn render(&self) -> Option<RenderedDocument> {
        self.inner.lock().await.session.render()
    }

    pub async fn dashboard(&self) -> Option<Dashboard> {
        self.inner.lock().await.session.dashboard()
    }

    /// Chat session of the active document.
    pub async fn chat(&self) -> Option<Arc<ChatSession>> {
        self.inner.lock().await.chat.clone()
    }

    /// Ask the assistant about the active document.
    pub async fn send_chat(&self, message: &str) -> Result<ChatMessage, ChatError> {
        let chat = self
            .chat()
            .await
            .ok_or_else(|| ChatError::Validation("no document is loaded".to_string()))?;

        let result = chat.send(message).await;
        self.audit.record(AuditEvent::ChatExchange {
            document_id: chat.document_id().to_string(),
            outcome: match &result {
                Ok(_) => ChatOutcome::Answered,
                Err(ChatError::Validation(_)) => ChatOutcome::Rejected,
                Err(ChatError::Busy) => ChatOutcome::Busy,
                Err(ChatError::Collaborator(_)) => ChatOutcome::Failed,
            },
            history_len: chat.history().len(),
        });
        result
    }
}
