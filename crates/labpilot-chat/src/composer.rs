//! Response composition and the per-message state machine.
//!
//! ```text
//! Received -> Routed -> Executing  -> Composed -> Appended
//!                    \-> Conversing -/
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use labpilot_core::types::Message;

use crate::adapters::CapabilityAdapters;
use crate::error::{AdapterError, ChatError};
use crate::model::{Action, GenerationRequest, LanguageModel, RoutingContext, ToolResult};
use crate::router::{RoutingDecision, Target};

// =============================================================================
// State machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeState {
    Received,
    Routed,
    Executing,
    Conversing,
    Composed,
    Appended,
}

impl fmt::Display for ComposeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComposeState::Received => "received",
            ComposeState::Routed => "routed",
            ComposeState::Executing => "executing",
            ComposeState::Conversing => "conversing",
            ComposeState::Composed => "composed",
            ComposeState::Appended => "appended",
        };
        f.write_str(name)
    }
}

/// Validate that a state transition is allowed.
pub fn validate_transition(from: ComposeState, to: ComposeState) -> Result<(), ChatError> {
    let valid = matches!(
        (from, to),
        (ComposeState::Received, ComposeState::Routed)
            | (ComposeState::Routed, ComposeState::Executing)
            | (ComposeState::Routed, ComposeState::Conversing)
            | (ComposeState::Executing, ComposeState::Composed)
            | (ComposeState::Conversing, ComposeState::Composed)
            | (ComposeState::Composed, ComposeState::Appended)
    );

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Tracks one message through the pipeline.
#[derive(Debug)]
pub struct MessageLifecycle {
    state: ComposeState,
}

impl MessageLifecycle {
    pub fn new() -> Self {
        Self {
            state: ComposeState::Received,
        }
    }

    pub fn state(&self) -> ComposeState {
        self.state
    }

    pub fn advance(&mut self, to: ComposeState) -> Result<(), ChatError> {
        validate_transition(self.state, to)?;
        debug!(from = %self.state, to = %to, "Message state transition");
        self.state = to;
        Ok(())
    }
}

impl Default for MessageLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Composer
// =============================================================================

/// Turns a routing decision into the assistant's reply message.
pub struct ResponseComposer {
    adapters: Arc<CapabilityAdapters>,
    model: Arc<dyn LanguageModel>,
    max_table_rows: usize,
}

impl ResponseComposer {
    pub fn new(
        adapters: Arc<CapabilityAdapters>,
        model: Arc<dyn LanguageModel>,
        max_table_rows: usize,
    ) -> Self {
        Self {
            adapters,
            model,
            max_table_rows,
        }
    }

    /// Build the reply for `text`.
    ///
    /// Not-found and validation failures become an explanatory reply.
    /// Collaborator and storage failures are returned as errors.
    pub async fn compose(
        &self,
        text: &str,
        decision: &RoutingDecision,
        context: &RoutingContext,
        lifecycle: &mut MessageLifecycle,
    ) -> Result<Message, ChatError> {
        if decision.action == Action::Converse {
            lifecycle.advance(ComposeState::Conversing)?;
            let reply = self.generate(text, context, None).await?;
            lifecycle.advance(ComposeState::Composed)?;
            return Ok(Message::assistant(reply));
        }

        lifecycle.advance(ComposeState::Executing)?;
        let message = match self.adapters.execute(decision).await {
            Ok(output) => {
                let result = ToolResult {
                    action: decision.action.name(),
                    summary: output.summary,
                    details: output.details,
                };
                let reply = self.generate(text, context, Some(result)).await?;
                Message::assistant(reply)
                    .with_table(output.table.map(|t| t.truncated(self.max_table_rows)))
                    .with_plot(output.plot)
            }
            Err(err) => match self.explain(&err, decision, context) {
                Some(explanation) => {
                    info!(action = decision.action.name(), error = %err, "Capability rejected request");
                    Message::assistant(explanation)
                }
                None => {
                    error!(action = decision.action.name(), error = %err, "Capability failed");
                    return Err(err.into());
                }
            },
        };
        lifecycle.advance(ComposeState::Composed)?;
        Ok(message)
    }

    async fn generate(
        &self,
        text: &str,
        context: &RoutingContext,
        result: Option<ToolResult>,
    ) -> Result<String, ChatError> {
        let request = GenerationRequest {
            message: text.to_string(),
            context: context.clone(),
            result,
        };
        self.model
            .generate(&request)
            .await
            .map_err(|e| ChatError::Collaborator(e.to_string()))
    }

    /// User-facing explanation of a rejected request, or `None` when the
    /// failure is the system's own and must fail the message.
    fn explain(
        &self,
        err: &AdapterError,
        decision: &RoutingDecision,
        context: &RoutingContext,
    ) -> Option<String> {
        let text = match err {
            AdapterError::NoActiveDataset => {
                "No dataset is loaded yet. Upload a CSV or Excel file first, then ask again."
                    .to_string()
            }
            AdapterError::DatasetNotFound(name) => {
                let mut text = format!("I couldn't find a dataset called '{}'.", name);
                if context.dataset_names.is_empty() {
                    text.push_str(" No datasets are loaded yet.");
                } else {
                    text.push_str(&format!(
                        " Loaded datasets: {}.",
                        context.dataset_names.join(", ")
                    ));
                }
                text
            }
            AdapterError::DocumentNotFound(name) => {
                let mut text = format!("I couldn't find a document called '{}'.", name);
                if context.document_names.is_empty() {
                    text.push_str(" No documents have been uploaded yet.");
                } else {
                    text.push_str(&format!(
                        " Uploaded documents: {}.",
                        context.document_names.join(", ")
                    ));
                }
                text
            }
            AdapterError::UnknownColumn(column) => {
                let dataset = match &decision.dataset {
                    Some(Target::Resolved(id)) => self.adapters.dataset(Some(id)).ok(),
                    _ => None,
                };
                match dataset {
                    Some(dataset) => format!(
                        "The dataset '{}' has no column named '{}'. Available columns: {}.",
                        dataset.name,
                        column,
                        dataset.column_names().join(", ")
                    ),
                    None => format!("There is no column named '{}'.", column),
                }
            }
            AdapterError::InvalidExpression(reason) => format!(
                "I couldn't understand that filter ({}). Try something like \
                 `expression > 2 and gene == 'TP53'`.",
                reason
            ),
            AdapterError::UnsupportedAggregation(func) => format!(
                "'{}' isn't a supported aggregation. Use one of: mean, sum, count, min, max, \
                 median, std.",
                func
            ),
            AdapterError::UnsupportedPlotType(kind) => format!(
                "I can't draw a '{}' chart. Supported charts: bar, line, scatter, pie, \
                 histogram, box.",
                kind
            ),
            AdapterError::InvalidParameter(reason) => {
                format!("I need a bit more information to do that: {}.", reason)
            }
            AdapterError::EmptyQuery => "What should I search the documents for?".to_string(),
            AdapterError::Collaborator(_) | AdapterError::Storage(_) => return None,
        };
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Valid transitions
    // =====================================================================

    #[test]
    fn test_execute_path() {
        let mut lc = MessageLifecycle::new();
        for to in [
            ComposeState::Routed,
            ComposeState::Executing,
            ComposeState::Composed,
            ComposeState::Appended,
        ] {
            lc.advance(to).unwrap();
        }
        assert_eq!(lc.state(), ComposeState::Appended);
    }

    #[test]
    fn test_conversation_path() {
        assert!(validate_transition(ComposeState::Routed, ComposeState::Conversing).is_ok());
        assert!(validate_transition(ComposeState::Conversing, ComposeState::Composed).is_ok());
    }

    // =====================================================================
    // Invalid transitions
    // =====================================================================

    #[test]
    fn test_cannot_skip_routing() {
        let err = validate_transition(ComposeState::Received, ComposeState::Executing).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid state transition from received to executing"
        );
    }

    #[test]
    fn test_cannot_append_before_composing() {
        assert!(validate_transition(ComposeState::Executing, ComposeState::Appended).is_err());
        assert!(validate_transition(ComposeState::Routed, ComposeState::Appended).is_err());
    }

    #[test]
    fn test_terminal_state() {
        for to in [
            ComposeState::Received,
            ComposeState::Routed,
            ComposeState::Composed,
            ComposeState::Appended,
        ] {
            assert!(validate_transition(ComposeState::Appended, to).is_err());
        }
    }

    #[test]
    fn test_failed_advance_keeps_state() {
        let mut lc = MessageLifecycle::new();
        assert!(lc.advance(ComposeState::Composed).is_err());
        assert_eq!(lc.state(), ComposeState::Received);
    }

    // =====================================================================
    // Explanations
    // =====================================================================

    fn composer() -> ResponseComposer {
        use crate::rules::RuleBasedModel;
        use labpilot_analysis::TabularEngine;
        use labpilot_core::config::SearchConfig;
        use labpilot_storage::DatasetRegistry;
        use labpilot_vector::{DocumentIndex, MockEmbedding};

        let adapters = CapabilityAdapters::new(
            Arc::new(DatasetRegistry::new()),
            Arc::new(DocumentIndex::new(Arc::new(MockEmbedding::new()))),
            Arc::new(TabularEngine::new()),
            SearchConfig::default(),
        );
        ResponseComposer::new(Arc::new(adapters), Arc::new(RuleBasedModel::new()), 50)
    }

    fn describe_decision() -> RoutingDecision {
        RoutingDecision {
            action: Action::Describe,
            dataset: None,
            document: None,
        }
    }

    #[test]
    fn test_caller_mistakes_are_explained() {
        let composer = composer();
        let context = RoutingContext::default();
        let text = composer
            .explain(
                &AdapterError::UnknownColumn("foo".into()),
                &describe_decision(),
                &context,
            )
            .unwrap();
        assert_eq!(text, "There is no column named 'foo'.");
        assert!(composer
            .explain(&AdapterError::NoActiveDataset, &describe_decision(), &context)
            .unwrap()
            .starts_with("No dataset is loaded yet"));
    }

    #[test]
    fn test_system_failures_are_not_explained() {
        let composer = composer();
        let context = RoutingContext::default();
        for err in [
            AdapterError::Collaborator("embedder down".into()),
            AdapterError::Storage("lock poisoned".into()),
        ] {
            assert_eq!(composer.explain(&err, &describe_decision(), &context), None);
        }
    }
}
