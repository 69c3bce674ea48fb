//! The chat service: one entry point per user message.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use labpilot_core::config::ChatConfig;
use labpilot_core::types::{Message, PlotSpec, SessionId, Table};
use labpilot_storage::{DatasetRegistry, SessionStore};
use labpilot_vector::DocumentIndex;

use crate::adapters::CapabilityAdapters;
use crate::composer::{ComposeState, MessageLifecycle, ResponseComposer};
use crate::error::ChatError;
use crate::model::{LanguageModel, RoutingContext};
use crate::router::IntentRouter;

/// The assistant's answer to one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotSpec>,
}

impl From<&Message> for ChatReply {
    fn from(message: &Message) -> Self {
        Self {
            text: message.content.clone(),
            table: message.table.clone(),
            plot: message.plot.clone(),
        }
    }
}

/// Routes, executes and records chat messages.
///
/// Messages to the same session are processed strictly in arrival order:
/// the session's fair mutex is held from history read to history append.
/// Different sessions proceed concurrently.
pub struct ChatService {
    config: ChatConfig,
    sessions: Arc<SessionStore>,
    datasets: Arc<DatasetRegistry>,
    documents: Arc<DocumentIndex>,
    router: IntentRouter,
    composer: ResponseComposer,
}

impl ChatService {
    pub fn new(
        config: ChatConfig,
        sessions: Arc<SessionStore>,
        adapters: Arc<CapabilityAdapters>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let datasets = Arc::clone(adapters.datasets());
        let documents = Arc::clone(adapters.documents());
        let composer = ResponseComposer::new(adapters, Arc::clone(&model), config.max_table_rows);
        Self {
            config,
            sessions,
            datasets,
            documents,
            router: IntentRouter::new(model),
            composer,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Check a message before any work is done.
    pub fn validate_message(&self, text: &str) -> Result<(), ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }
        Ok(())
    }

    /// Handle one user message and return the assistant's reply.
    ///
    /// Processing runs on its own task, so a caller that goes away does not
    /// leave the session half-updated: the user message and the reply are
    /// appended together or not at all.
    pub async fn handle_message(
        self: &Arc<Self>,
        session: &SessionId,
        text: &str,
    ) -> Result<ChatReply, ChatError> {
        self.validate_message(text)?;

        let service = Arc::clone(self);
        let session = session.clone();
        let text = text.trim().to_string();
        tokio::spawn(async move { service.process(session, text).await })
            .await
            .map_err(|e| {
                error!(error = %e, "Chat task did not complete");
                ChatError::Internal(format!("chat task failed: {}", e))
            })?
    }

    async fn process(&self, session: SessionId, text: String) -> Result<ChatReply, ChatError> {
        let handle = self.sessions.session(&session)?;
        let mut guard = handle.lock().await;
        let mut lifecycle = MessageLifecycle::new();
        let user_message = Message::user(text.as_str());

        let history = guard.recent(self.config.history_window).to_vec();
        let context = RoutingContext::gather(&self.datasets, &self.documents, history)?;

        let decision = self
            .router
            .route(&text, &context, &self.datasets, &self.documents)
            .await;
        lifecycle.advance(ComposeState::Routed)?;

        let reply = self
            .composer
            .compose(&text, &decision, &context, &mut lifecycle)
            .await?;

        guard.append(user_message);
        guard.append(reply.clone());
        lifecycle.advance(ComposeState::Appended)?;
        debug!(session_id = %session, history = guard.len(), "Session updated");

        info!(
            session_id = %session,
            action = decision.action.name(),
            table = reply.table.is_some(),
            plot = reply.plot.is_some(),
            "Chat message handled"
        );
        Ok(ChatReply::from(&reply))
    }

    /// Full history of a session, oldest first.
    pub async fn history(&self, session: &SessionId) -> Result<Vec<Message>, ChatError> {
        Ok(self.sessions.history(session).await?)
    }

    /// Clear a session's history.
    pub async fn clear(&self, session: &SessionId) -> Result<(), ChatError> {
        Ok(self.sessions.clear(session).await?)
    }
}
