use thiserror::Error;

/// Top-level error type for Labpilot.
///
/// Subsystem crates define their own error enums and convert into this one at
/// crate boundaries. [`LabpilotError::kind`] collapses every variant into the
/// four-way taxonomy the chat layer uses to decide between an explained reply
/// and a hard request failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LabpilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A dataset, document, or session id did not resolve.
    NotFound,
    /// Bad expression, unknown column, unsupported option.
    Validation,
    /// Embedding, search, or generation backend failed or timed out.
    Collaborator,
    /// A registry or store could not be written or read.
    Storage,
    /// Configuration could not be loaded.
    Config,
    /// Filesystem failure.
    Io,
    /// A bug: a panicked or cancelled task.
    Internal,
}

impl LabpilotError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LabpilotError::Config(_) => ErrorKind::Config,
            LabpilotError::NotFound(_) => ErrorKind::NotFound,
            LabpilotError::Validation(_) => ErrorKind::Validation,
            LabpilotError::Collaborator(_) => ErrorKind::Collaborator,
            LabpilotError::Storage(_) | LabpilotError::Serialization(_) => ErrorKind::Storage,
            LabpilotError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<toml::de::Error> for LabpilotError {
    fn from(err: toml::de::Error) -> Self {
        LabpilotError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LabpilotError {
    fn from(err: toml::ser::Error) -> Self {
        LabpilotError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LabpilotError {
    fn from(err: serde_json::Error) -> Self {
        LabpilotError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Labpilot operations.
pub type Result<T> = std::result::Result<T, LabpilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(LabpilotError, &str)> = vec![
            (
                LabpilotError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                LabpilotError::NotFound("dataset abc".to_string()),
                "Not found: dataset abc",
            ),
            (
                LabpilotError::Validation("unknown column".to_string()),
                "Validation error: unknown column",
            ),
            (
                LabpilotError::Collaborator("timeout".to_string()),
                "Collaborator error: timeout",
            ),
            (
                LabpilotError::Storage("lock poisoned".to_string()),
                "Storage error: lock poisoned",
            ),
            (
                LabpilotError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            LabpilotError::NotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LabpilotError::Validation("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            LabpilotError::Collaborator("x".into()).kind(),
            ErrorKind::Collaborator
        );
        assert_eq!(LabpilotError::Storage("x".into()).kind(), ErrorKind::Storage);
        assert_eq!(
            LabpilotError::Serialization("x".into()).kind(),
            ErrorKind::Storage
        );
        assert_eq!(LabpilotError::Config("x".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LabpilotError = io_err.into();
        assert!(matches!(err, LabpilotError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let err: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        let err: LabpilotError = err.unwrap_err().into();
        assert!(matches!(err, LabpilotError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: LabpilotError = err.unwrap_err().into();
        assert!(matches!(err, LabpilotError::Serialization(_)));
    }
}
