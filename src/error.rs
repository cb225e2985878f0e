//! Error types for the Galinheiro client.

use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Errors that can occur when using the Galinheiro client.
#[derive(Debug, Error)]
pub enum GalinheiroError {
    /// Failed to send a frame through the realtime transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the realtime transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a wire type.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to parse a TOML settings document.
    #[error("invalid settings: {0}")]
    Settings(#[from] toml::de::Error),

    /// Attempted an operation that requires an active realtime connection.
    #[error("not connected to realtime service")]
    NotConnected,

    /// The backend (or a local guard mirroring it) refused the operation.
    ///
    /// These are domain errors: they are turned into notices at the call
    /// site and never bubble up as crashes.
    #[error("{code:?}: {message}")]
    Rejected {
        /// Structured code, as reported by the backend.
        code: ErrorCode,
        /// Human-readable message.
        message: String,
    },

    /// The backend could not be reached or returned an unexpected failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GalinheiroError {
    /// Build a [`Rejected`](Self::Rejected) error using the code's description
    /// as the message.
    pub fn rejected(code: ErrorCode) -> Self {
        let message = code.description().to_string();
        Self::Rejected { code, message }
    }

    /// Returns the structured code of a domain error.
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` for errors the user caused or can act upon, as opposed
    /// to transient infrastructure failures.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// A specialized [`Result`] type for Galinheiro client operations.
pub type Result<T> = std::result::Result<T, GalinheiroError>;
