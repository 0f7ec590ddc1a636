//! Error types for cardmill.

use thiserror::Error;

/// Result type alias using cardmill's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cardmill operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Request is missing required fields or is otherwise malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Resource not found (unknown card or job)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persona, theme, or template option is not configured
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    /// Non-success response from an external service
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Polling exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Job record absent at dispatch time; no status update is possible
    #[error("Data loss: {0}")]
    DataLoss(String),

    /// A work item with the same identity is already enqueued
    #[error("Already queued: {0}")]
    AlreadyQueued(String),

    /// Job store or queue substrate failed
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Merge result had an unexpected shape; carries the raw payloads
    #[error("{message}")]
    MergeOutput {
        message: String,
        details: serde_json::Value,
    },

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of [`Error`], used for retry decisions and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    UnknownOption,
    Upstream,
    Timeout,
    DataLoss,
    AlreadyQueued,
    Store,
    Serialization,
    Config,
    Internal,
    MergeOutput,
    Io,
}

impl Error {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::UnknownOption(_) => ErrorKind::UnknownOption,
            Error::Upstream(_) => ErrorKind::Upstream,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::DataLoss(_) => ErrorKind::DataLoss,
            Error::AlreadyQueued(_) => ErrorKind::AlreadyQueued,
            Error::Store(_) => ErrorKind::Store,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Config(_) => ErrorKind::Config,
            Error::Internal(_) => ErrorKind::Internal,
            Error::MergeOutput { .. } => ErrorKind::MergeOutput,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// HTTP status code for synchronous callers, derived from the kind.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest | ErrorKind::UnknownOption => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Upstream | ErrorKind::MergeOutput => 502,
            ErrorKind::Timeout => 504,
            _ => 500,
        }
    }

    /// Diagnostic context attached to this error, if any.
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            Error::MergeOutput { details, .. } => Some(details),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_request() {
        let err = Error::InvalidRequest("cardId is required".to_string());
        assert_eq!(err.to_string(), "Invalid request: cardId is required");
    }

    #[test]
    fn test_error_display_unknown_option() {
        let err = Error::UnknownOption("persona: pirate".to_string());
        assert_eq!(err.to_string(), "Unknown option: persona: pirate");
    }

    #[test]
    fn test_error_kind_roundtrip() {
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::Timeout("x".into()).kind(), ErrorKind::Timeout);
        assert_eq!(Error::DataLoss("x".into()).kind(), ErrorKind::DataLoss);
        assert_eq!(
            Error::AlreadyQueued("x".into()).kind(),
            ErrorKind::AlreadyQueued
        );
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(Error::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(Error::UnknownOption("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Upstream("x".into()).status_code(), 502);
        assert_eq!(Error::Timeout("x".into()).status_code(), 504);
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
        assert_eq!(Error::Store("x".into()).status_code(), 500);
    }

    #[test]
    fn test_merge_output_carries_details() {
        let err = Error::MergeOutput {
            message: "No output URL returned from merge result".to_string(),
            details: serde_json::json!({"result": {"status": "failed"}}),
        };
        assert_eq!(err.status_code(), 502);
        assert!(err.details().is_some());
        assert_eq!(err.to_string(), "No output URL returned from merge result");
    }

    #[test]
    fn test_details_absent_for_plain_variants() {
        assert!(Error::Upstream("x".into()).details().is_none());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
