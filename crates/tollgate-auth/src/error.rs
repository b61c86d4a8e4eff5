//! Error types for the authorization pipeline.

use crate::request::ApiResponse;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a protected request could not be recovered after a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The session held no refresh token.
    NoRefreshToken,
    /// The failing call was the refresh endpoint itself.
    RefreshEndpoint,
    /// The credential issuer rejected the refresh token or timed out.
    RefreshFailed,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::NoRefreshToken => write!(f, "no refresh token available"),
            Termination::RefreshEndpoint => write!(f, "refresh endpoint rejected credentials"),
            Termination::RefreshFailed => write!(f, "session refresh failed"),
        }
    }
}

/// Errors surfaced by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session could not be recovered; carries the original 401 response.
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        reason: Termination,
        response: ApiResponse,
    },

    /// The transport failed before a response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a terminal authorization failure.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized { .. })
    }

    /// HTTP status of the response behind this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Unauthorized { response, .. } => Some(response.status().as_u16()),
            _ => None,
        }
    }
}

/// Errors from the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        TransportError::InvalidRequest(e.to_string())
    }
}

/// Errors from the credential issuer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IssuerError {
    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// The issuer rejected the refresh token.
    #[error("Refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The issuer's response could not be parsed.
    #[error("Invalid issuer response: {0}")]
    InvalidResponse(String),

    /// The refresh call exceeded the configured timeout.
    #[error("Refresh timed out")]
    Timeout,
}

impl From<reqwest::Error> for IssuerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            IssuerError::Timeout
        } else {
            IssuerError::Network(e.to_string())
        }
    }
}

/// Errors from the session storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to read or write the storage medium.
    #[error("failed to access session file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Stored session could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
