//! Error types for quay-connector.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("no connector available for {url}: {reason}")]
    NoConnector { url: String, reason: String },

    #[error("connector is closed")]
    Closed,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("authorization denied for {0}")]
    AuthDenied(String),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("checksum mismatch: expected {expected}, actual {actual}")]
    ChecksumFailure { expected: String, actual: String },

    #[error("no remote checksum available for {0}")]
    ChecksumUnavailable(String),

    #[error("transfer cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Flatten an error and its source chain into one message.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
