//! Intent routing: classify a message and resolve the dataset or document it
//! targets.

use std::sync::Arc;

use tracing::{debug, info, warn};

use labpilot_core::types::{DatasetId, DocumentId};
use labpilot_storage::DatasetRegistry;
use labpilot_vector::DocumentIndex;

use crate::model::{Action, Classification, LanguageModel, RoutingContext};

/// A dataset or document reference after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<Id> {
    Resolved(Id),
    /// Named by the user but not loaded.
    Unknown(String),
}

/// The action to run and what it runs against.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub action: Action,
    /// `None` only when no dataset is named and none is active.
    pub dataset: Option<Target<DatasetId>>,
    /// Search scope; `None` searches every document.
    pub document: Option<Target<DocumentId>>,
}

pub struct IntentRouter {
    model: Arc<dyn LanguageModel>,
}

impl IntentRouter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Decide what `text` asks for. Never fails: a classifier error routes
    /// the message to conversation.
    ///
    /// A dataset named in the message takes precedence over the active one.
    pub async fn route(
        &self,
        text: &str,
        context: &RoutingContext,
        datasets: &DatasetRegistry,
        documents: &DocumentIndex,
    ) -> RoutingDecision {
        let classification = match self.model.classify(text, context).await {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    model = self.model.name(),
                    error = %e,
                    "Intent classification failed, falling back to conversation"
                );
                Classification::converse()
            }
        };

        let Classification {
            action,
            dataset,
            document,
        } = classification;

        let dataset = if action.uses_dataset() {
            resolve_dataset(dataset.as_deref(), context, datasets)
        } else {
            None
        };
        let document = match (&action, document.as_deref()) {
            (Action::Search { .. }, Some(name)) => Some(resolve_document(name, documents)),
            _ => None,
        };

        info!(action = action.name(), model = self.model.name(), "Message routed");
        RoutingDecision {
            action,
            dataset,
            document,
        }
    }
}

fn resolve_dataset(
    mention: Option<&str>,
    context: &RoutingContext,
    datasets: &DatasetRegistry,
) -> Option<Target<DatasetId>> {
    let active = || {
        context
            .active_dataset
            .as_ref()
            .map(|a| Target::Resolved(a.id.clone()))
    };
    let Some(name) = mention.map(str::trim).filter(|n| !n.is_empty()) else {
        return active();
    };

    match datasets.find_by_name(name) {
        Ok(Some(dataset)) => Some(Target::Resolved(dataset.id.clone())),
        Ok(None) => {
            let id = DatasetId::new(name);
            if datasets.get(&id).is_ok() {
                Some(Target::Resolved(id))
            } else {
                debug!(dataset = %name, "Named dataset is not loaded");
                Some(Target::Unknown(name.to_string()))
            }
        }
        Err(e) => {
            warn!(error = %e, "Dataset lookup failed, using the active dataset");
            active()
        }
    }
}

fn resolve_document(name: &str, documents: &DocumentIndex) -> Target<DocumentId> {
    match documents.find_by_name(name) {
        Ok(Some(document)) => Target::Resolved(document.id.clone()),
        Ok(None) => {
            let id = DocumentId::new(name);
            if documents.get(&id).is_ok() {
                Target::Resolved(id)
            } else {
                Target::Unknown(name.to_string())
            }
        }
        Err(e) => {
            warn!(error = %e, "Document lookup failed");
            Target::Unknown(name.to_string())
        }
    }
}
