//! Error types for adapters and the chat pipeline.

use labpilot_analysis::AnalysisError;
use labpilot_core::error::{ErrorKind, LabpilotError};

/// Typed failure of a capability adapter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    #[error("no dataset is loaded")]
    NoActiveDataset,
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("unsupported aggregation: {0}")]
    UnsupportedAggregation(String),
    #[error("unsupported plot type: {0}")]
    UnsupportedPlotType(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("search query cannot be empty")]
    EmptyQuery,
    #[error("collaborator error: {0}")]
    Collaborator(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl AdapterError {
    /// Position in the four-way error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::DatasetNotFound(_)
            | AdapterError::DocumentNotFound(_)
            | AdapterError::NoActiveDataset => ErrorKind::NotFound,
            AdapterError::InvalidExpression(_)
            | AdapterError::UnknownColumn(_)
            | AdapterError::UnsupportedAggregation(_)
            | AdapterError::UnsupportedPlotType(_)
            | AdapterError::InvalidParameter(_)
            | AdapterError::EmptyQuery => ErrorKind::Validation,
            AdapterError::Collaborator(_) => ErrorKind::Collaborator,
            AdapterError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Map a core error raised while serving a dataset operation.
    pub fn from_dataset_error(err: LabpilotError, id: &str) -> Self {
        Self::from_core(err, |_| AdapterError::DatasetNotFound(id.to_string()))
    }

    /// Map a core error raised while serving a document operation.
    pub fn from_document_error(err: LabpilotError, id: &str) -> Self {
        Self::from_core(err, |_| AdapterError::DocumentNotFound(id.to_string()))
    }

    fn from_core(err: LabpilotError, not_found: impl FnOnce(String) -> Self) -> Self {
        match err {
            LabpilotError::NotFound(msg) => not_found(msg),
            LabpilotError::Validation(msg) => AdapterError::InvalidParameter(msg),
            LabpilotError::Collaborator(msg) => AdapterError::Collaborator(msg),
            other => AdapterError::Storage(other.to_string()),
        }
    }
}

impl From<AnalysisError> for AdapterError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InvalidExpression(m) => AdapterError::InvalidExpression(m),
            AnalysisError::UnknownColumn(c) => AdapterError::UnknownColumn(c),
            AnalysisError::UnsupportedAggregation(f) => AdapterError::UnsupportedAggregation(f),
            AnalysisError::UnsupportedPlotType(t) => AdapterError::UnsupportedPlotType(t),
            AnalysisError::InvalidParameter(m) | AnalysisError::UnreadableFile(m) => {
                AdapterError::InvalidParameter(m)
            }
        }
    }
}

/// Errors from the chat pipeline that fail the request.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("collaborator error: {0}")]
    Collaborator(String),
    #[error("storage error: {0}")]
    Storage(String),
    /// The task processing the message panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Disabled | ChatError::EmptyMessage | ChatError::MessageTooLong(_) => {
                ErrorKind::Validation
            }
            ChatError::Collaborator(_) => ErrorKind::Collaborator,
            ChatError::InvalidTransition { .. } | ChatError::Storage(_) => ErrorKind::Storage,
            ChatError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<LabpilotError> for ChatError {
    fn from(err: LabpilotError) -> Self {
        match err {
            LabpilotError::Collaborator(msg) => ChatError::Collaborator(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<AdapterError> for ChatError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Collaborator(msg) => ChatError::Collaborator(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
