use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChatError, CollaboratorError};
use crate::llm::{HistoryTurn, LegalAssistant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Clears the awaiting flag when the send finishes or is dropped mid-flight.
struct AwaitingGuard<'a>(&'a AtomicBool);

impl<'a> AwaitingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for AwaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Conversation bound to one document for its whole life. While a reply is
/// pending further sends are rejected without reaching the assistant.
pub struct ChatSession {
    document_id: String,
    /// Raw document content; redaction only applies to what is displayed.
    context: String,
    assistant: Arc<dyn LegalAssistant>,
    history: Mutex<Vec<ChatMessage>>,
    awaiting: AtomicBool,
}

impl ChatSession {
    pub fn new(
        document_id: impl Into<String>,
        context: impl Into<String>,
        assistant: Arc<dyn LegalAssistant>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            context: context.into(),
            assistant,
            history: Mutex::new(Vec::new()),
            awaiting: AtomicBool::new(false),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting.load(Ordering::Acquire)
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock_history().clone()
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `message` and wait for the assistant's answer.
    ///
    /// The user message is recorded before the assistant is called and stays
    /// in the history even when the call fails. On failure no assistant
    /// message is added.
    pub async fn send(&self, message: &str) -> Result<ChatMessage, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::Validation("message must not be empty".to_string()));
        }

        let _awaiting = AwaitingGuard::acquire(&self.awaiting).ok_or(ChatError::Busy)?;

        let prior: Vec<HistoryTurn> = {
            let mut history = self.lock_history();
            let prior = history
                .iter()
                .map(|m| HistoryTurn {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect();
            history.push(ChatMessage::new(ChatRole::User, message.to_string()));
            prior
        };

        let reply = match self.assistant.reply(&prior, message, &self.context).await {
            Ok(reply) if reply.trim().is_empty() => Err(CollaboratorError::EmptyResponse),
            other => other,
        };

        match reply {
            Ok(reply) => {
                let answer = ChatMessage::new(ChatRole::Assistant, reply);
                self.lock_history().push(answer.clone());
                tracing::debug!(document_id = %self.document_id, "Assistant replied");
                Ok(answer)
            }
            Err(e) => {
                tracing::warn!(
                    document_id = %self.document_id,
                    error = %e,
                    "Chat assistant failed"
                );
                Err(ChatError::Collaborator(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    struct ScriptedAssistant {
        calls: AtomicUsize,
        seen_history: Mutex<Vec<usize>>,
        reply: Result<String, CollaboratorError>,
    }

    impl ScriptedAssistant {
        fn new(reply: Result<String, CollaboratorError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen_history: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    #[async_trait]
    impl LegalAssistant for ScriptedAssistant {
        async fn reply(
            &self,
            history: &[HistoryTurn],
            _message: &str,
            context: &str,
        ) -> Result<String, CollaboratorError> {
            assert_eq!(context, "RAW 12.345.678/0001-99");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_history.lock().expect("lock").push(history.len());
            self.reply.clone()
        }
    }

    struct GatedAssistant {
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl LegalAssistant for GatedAssistant {
        async fn reply(
            &self,
            _history: &[HistoryTurn],
            _message: &str,
            _context: &str,
        ) -> Result<String, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn successful_send_appends_user_then_assistant() {
        let assistant = ScriptedAssistant::new(Ok("Clause 4.2 is abusive.".to_string()));
        let session = ChatSession::new("doc", "RAW 12.345.678/0001-99", assistant.clone());

        let answer = session.send("  Is 4.2 valid?  ").await.expect("reply");
        assert_eq!(answer.role, ChatRole::Assistant);

        session.send("And 12?").await.expect("reply");
        let history = session.history();
        let roles: Vec<ChatRole> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Assistant, ChatRole::User, ChatRole::Assistant]
        );
        assert_eq!(history[0].content, "Is 4.2 valid?");
        assert_eq!(*assistant.seen_history.lock().expect("lock"), vec![0, 2]);
        assert!(!session.is_awaiting_reply());
    }

    #[tokio::test]
    async fn failed_send_keeps_user_message_only() {
        let assistant = ScriptedAssistant::new(Err(CollaboratorError::Timeout));
        let session = ChatSession::new("doc", "RAW 12.345.678/0001-99", assistant);

        let err = session.send("Hello").await.expect_err("must fail");
        assert_eq!(err, ChatError::Collaborator(CollaboratorError::Timeout));
        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, ChatRole::User);
        assert!(!session.is_awaiting_reply());
    }

    #[tokio::test]
    async fn blank_reply_counts_as_failure() {
        let assistant = ScriptedAssistant::new(Ok("   ".to_string()));
        let session = ChatSession::new("doc", "RAW 12.345.678/0001-99", assistant);
        let err = session.send("Hello").await.expect_err("must fail");
        assert_eq!(err, ChatError::Collaborator(CollaboratorError::EmptyResponse));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_the_assistant() {
        let assistant = ScriptedAssistant::new(Ok("unused".to_string()));
        let session = ChatSession::new("doc", "RAW 12.345.678/0001-99", assistant.clone());
        assert!(matches!(
            session.send(" \n ").await,
            Err(ChatError::Validation(_))
        ));
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 0);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn send_while_pending_is_rejected_without_second_call() {
        let assistant = Arc::new(GatedAssistant {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let session = Arc::new(ChatSession::new("doc", "ctx", assistant.clone()));

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send("first").await }
        });
        assistant.entered.notified().await;
        assert!(session.is_awaiting_reply());

        assert_eq!(session.send("second").await, Err(ChatError::Busy));
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 1);

        assistant.release.notify_one();
        first.await.expect("join").expect("reply");
        assert!(!session.is_awaiting_reply());
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn dropped_send_releases_the_session() {
        let assistant = Arc::new(GatedAssistant {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let session = Arc::new(ChatSession::new("doc", "ctx", assistant.clone()));

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send("first").await }
        });
        assistant.entered.notified().await;
        pending.abort();
        let _ = pending.await;

        assert!(!session.is_awaiting_reply());
        assert_eq!(session.history().len(), 1);
    }
}
