//! Error types for the sink client

use thiserror::Error;

/// Result type alias for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur when talking to the remote log sink
#[derive(Debug, Error)]
pub enum SinkError {
    /// A call to the sink failed (transport, throttling, rejected request)
    #[error("{operation} failed: {message}")]
    RequestFailed {
        /// Name of the sink operation (e.g. "PutLogEvents")
        operation: &'static str,
        /// Error detail reported by the client
        message: String,
    },

    /// An event could not be turned into a sink record
    #[error("Invalid log event: {0}")]
    InvalidEvent(String),

    /// The client could not be constructed from the given settings
    #[error("Invalid sink configuration: {0}")]
    InvalidConfig(String),
}

impl SinkError {
    /// Create a request error for the named operation
    pub fn request_failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            operation,
            message: message.into(),
        }
    }
}
