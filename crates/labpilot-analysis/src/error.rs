use thiserror::Error;

use labpilot_core::error::LabpilotError;

/// Errors raised by the analysis engine. All of them are caller mistakes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Unsupported aggregation '{0}'")]
    UnsupportedAggregation(String),

    #[error("Unsupported plot type '{0}'")]
    UnsupportedPlotType(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Could not read file: {0}")]
    UnreadableFile(String),
}

impl From<AnalysisError> for LabpilotError {
    fn from(err: AnalysisError) -> Self {
        LabpilotError::Validation(err.to_string())
    }
}
