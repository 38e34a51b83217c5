//! Error types for the conversion engine.

use thiserror::Error;

/// Errors raised by conversions and by the PDS client.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported input (bad AT-URI, bad web URL, missing
    /// discriminator, incompatible output type).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XRPC error from server.
    #[error("XRPC error: {error} - {message}")]
    Xrpc { error: String, message: String },

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidInput`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
