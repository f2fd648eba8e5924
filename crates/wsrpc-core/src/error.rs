//! Client error types with rich context

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Client error types organized by layer
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection/Transport Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Transport is not open")]
    TransportNotOpen,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport error: {message}")]
    Transport { message: String },

    // ─────────────────────────────────────────────────────────────
    // Remote Errors
    // ─────────────────────────────────────────────────────────────
    #[error("{0}")]
    Remote(RemoteError),

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },
}

/// Coarse classification of an [`Error`].
///
/// Callers that only care about *why* a call failed (as opposed to the exact
/// variant) should branch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A send was attempted while the socket was not open.
    TransportNotOpen,
    /// The transport closed or errored while the call was outstanding.
    ConnectionClosed,
    /// The peer answered with a JSON-RPC error payload.
    RemoteError,
    /// Writing a frame to the socket failed.
    Transport,
    /// Bad URL or settings.
    Configuration,
    /// Local I/O or serialization failure.
    Io,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Wrap a peer-supplied JSON-RPC error payload.
    pub fn remote(payload: Value) -> Self {
        Self::Remote(RemoteError::new(payload))
    }

    /// Map this error onto its [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TransportNotOpen => ErrorKind::TransportNotOpen,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            Error::Remote(_) => ErrorKind::RemoteError,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::InvalidUrl { .. } | Error::Config { .. } | Error::ConfigInvalid { .. } => {
                ErrorKind::Configuration
            }
            Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }

    /// The peer's error payload, if this is a remote error.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Check if a caller may reasonably retry after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TransportNotOpen
                | Error::ConnectionClosed
                | Error::Transport { .. }
                | Error::Remote(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Remote error payload
// ─────────────────────────────────────────────────────────────────

/// A JSON-RPC error payload, kept exactly as the peer sent it.
///
/// Well-behaved peers send `{"code": <int>, "message": <string>, "data": ...}`;
/// the accessors read those fields when present but nothing is discarded when
/// the payload has some other shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    payload: Value,
}

impl RemoteError {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Numeric `code` field, if present.
    pub fn code(&self) -> Option<i64> {
        self.payload.get("code").and_then(Value::as_i64)
    }

    /// `message` field, if present.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }

    /// `data` field, if present.
    pub fn data(&self) -> Option<&Value> {
        self.payload.get("data")
    }

    /// The untouched payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code(), self.message()) {
            (Some(code), Some(message)) => write!(f, "Remote error {code}: {message}"),
            (None, Some(message)) => write!(f, "Remote error: {message}"),
            _ => write!(f, "Remote error: {}", self.payload),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
