//! The language-model seam: intent classification and reply generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use labpilot_core::error::LabpilotError;
use labpilot_core::types::{Column, DatasetId, Message};
use labpilot_storage::DatasetRegistry;
use labpilot_vector::DocumentIndex;

// =============================================================================
// Actions
// =============================================================================

/// What a message asks for, with the parameters the classifier extracted.
///
/// Parameters are passed through as text; the adapters validate them, so a
/// misspelled column or an unknown chart kind reaches the user as an
/// explanation rather than a silent fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Filter {
        conditions: String,
    },
    Aggregate {
        group_column: String,
        value_column: String,
        #[serde(default)]
        agg_func: Option<String>,
    },
    Describe,
    Plot {
        plot_type: String,
        x_column: String,
        #[serde(default)]
        y_column: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
    Search {
        query: String,
        #[serde(default)]
        top_k: Option<usize>,
    },
    Converse,
}

impl Action {
    /// Short name used in logs and tool-result prompts.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Filter { .. } => "filter_data",
            Action::Aggregate { .. } => "aggregate_data",
            Action::Describe => "describe_data",
            Action::Plot { .. } => "generate_plot",
            Action::Search { .. } => "search_documents",
            Action::Converse => "converse",
        }
    }

    /// Whether the action runs against a dataset.
    pub fn uses_dataset(&self) -> bool {
        matches!(
            self,
            Action::Filter { .. } | Action::Aggregate { .. } | Action::Describe | Action::Plot { .. }
        )
    }
}

/// Classifier output: the action plus any dataset or document the user named.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub action: Action,
    pub dataset: Option<String>,
    pub document: Option<String>,
}

impl Classification {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            dataset: None,
            document: None,
        }
    }

    pub fn converse() -> Self {
        Self::new(Action::Converse)
    }

    pub fn with_dataset(mut self, name: Option<String>) -> Self {
        self.dataset = name;
        self
    }

    pub fn with_document(mut self, name: Option<String>) -> Self {
        self.document = name;
        self
    }
}

// =============================================================================
// Context
// =============================================================================

/// Schema snapshot of the dataset a message would act on by default.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDataset {
    pub id: DatasetId,
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: usize,
}

/// What the model may know when classifying or writing a reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingContext {
    pub active_dataset: Option<ActiveDataset>,
    pub dataset_names: Vec<String>,
    pub document_names: Vec<String>,
    /// Recent session history, oldest first.
    pub history: Vec<Message>,
}

impl RoutingContext {
    /// Snapshot the registries. `history` is the already-windowed history.
    pub fn gather(
        datasets: &DatasetRegistry,
        documents: &DocumentIndex,
        history: Vec<Message>,
    ) -> Result<Self, LabpilotError> {
        let active_dataset = datasets.active()?.map(|d| ActiveDataset {
            id: d.id.clone(),
            name: d.name.clone(),
            columns: d.columns.clone(),
            row_count: d.row_count(),
        });
        Ok(Self {
            active_dataset,
            dataset_names: datasets.names()?,
            document_names: documents.names()?,
            history,
        })
    }

    /// Columns of the active dataset, empty when none is loaded.
    pub fn columns(&self) -> &[Column] {
        self.active_dataset
            .as_ref()
            .map(|d| d.columns.as_slice())
            .unwrap_or(&[])
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Outcome of an executed capability, handed to the model for phrasing.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub action: &'static str,
    /// Plain-language description of the result.
    pub summary: String,
    pub details: Option<Value>,
}

/// Input for writing the assistant's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub message: String,
    pub context: RoutingContext,
    /// Present when a capability ran; absent for free conversation.
    pub result: Option<ToolResult>,
}

/// A model that can classify intent and write replies.
///
/// Failures are reported as [`LabpilotError::Collaborator`].
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier for logs.
    fn name(&self) -> &str;

    /// Decide which action `text` asks for.
    async fn classify(
        &self,
        text: &str,
        context: &RoutingContext,
    ) -> Result<Classification, LabpilotError>;

    /// Write the assistant's reply text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LabpilotError>;
}
