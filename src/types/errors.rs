//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Failures that happen after a relay
//! session has started are converted into a terminal `error` event; failures
//! before that are answered synchronously via [`Error::status_code`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the relay.
#[derive(Error, Debug)]
pub enum Error {
    /// Backend process cannot be reached (connection refused, DNS failure).
    #[error("transport unreachable: {0}")]
    TransportUnreachable(String),

    /// Backend reachable but answered with a non-success status.
    #[error("upstream rejected: {status} {reason}")]
    UpstreamRejected { status: u16, reason: String },

    /// I/O failure after the upstream stream was established.
    #[error("stream read failure: {0}")]
    StreamReadFailure(String),

    /// No response within the connection budget.
    #[error("timeout exceeded: {0}")]
    TimeoutExceeded(String),

    /// Inbound trigger is missing its required free-text field.
    #[error("malformed trigger: {0}")]
    MalformedTrigger(String),

    /// Cooperative cancellation observed by an upstream operation.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialisable error discriminator carried in downstream `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    TransportUnreachable,
    UpstreamRejected,
    StreamReadFailure,
    TimeoutExceeded,
    MalformedTrigger,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TransportUnreachable => "TransportUnreachable",
            ErrorKind::UpstreamRejected => "UpstreamRejected",
            ErrorKind::StreamReadFailure => "StreamReadFailure",
            ErrorKind::TimeoutExceeded => "TimeoutExceeded",
            ErrorKind::MalformedTrigger => "MalformedTrigger",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Discriminator for the downstream error event.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TransportUnreachable(_) => ErrorKind::TransportUnreachable,
            Error::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
            Error::StreamReadFailure(_) | Error::Io(_) => ErrorKind::StreamReadFailure,
            Error::TimeoutExceeded(_) => ErrorKind::TimeoutExceeded,
            Error::MalformedTrigger(_) => ErrorKind::MalformedTrigger,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Config(_) | Error::Internal(_) | Error::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Upstream HTTP status, if the backend answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Error::UpstreamRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Remediation hints shown to the consumer when the backend is unreachable.
    pub fn troubleshooting(&self) -> Option<BTreeMap<String, String>> {
        match self {
            Error::TransportUnreachable(_) => Some(
                [
                    (
                        "Check backend server",
                        "Make sure the backend is running: cd backend && python app.py server",
                    ),
                    ("Check port", "Verify the backend listens on the configured port"),
                    ("Check CORS", "The backend should allow CORS from the frontend"),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ),
            _ => None,
        }
    }

    /// HTTP status for failures answered synchronously (before a session exists).
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MalformedTrigger(_) => 400,
            Error::TransportUnreachable(_) | Error::UpstreamRejected { .. } => 503,
            Error::TimeoutExceeded(_) => 504,
            _ => 500,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn transport_unreachable(msg: impl Into<String>) -> Self {
        Self::TransportUnreachable(msg.into())
    }

    pub fn upstream_rejected(status: u16, reason: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            status,
            reason: reason.into(),
        }
    }

    pub fn stream_read(msg: impl Into<String>) -> Self {
        Self::StreamReadFailure(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::TimeoutExceeded(msg.into())
    }

    pub fn malformed_trigger(msg: impl Into<String>) -> Self {
        Self::MalformedTrigger(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

// reqwest folds every transport failure into one error type; split it along
// the relay's taxonomy.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::timeout(err.to_string())
        } else if err.is_connect() {
            Error::transport_unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            Error::upstream_rejected(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            )
        } else if err.is_body() || err.is_decode() {
            Error::stream_read(err.to_string())
        } else if err.is_request() {
            Error::transport_unreachable(err.to_string())
        } else {
            Error::internal(err.to_string())
        }
    }
}
