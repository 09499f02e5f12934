//! Error handling for the Beam node clients
//!
//! One error type covers the three clients. Variants map onto the failure
//! classes the clients distinguish: caller validation, API status errors,
//! transport errors, JSON-RPC error envelopes and persistent connection
//! lifecycle errors.

use crate::context::ConnectionContext;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Beam node clients
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an argument outside its allowed type or range
    #[error("Invalid argument `{field}`: {message}")]
    Validation { field: String, message: String },

    /// API server answered with a status other than 200
    #[error("API error {status}: {reason}")]
    Api { status: u16, reason: String },

    /// HTTP transport errors (refused, reset, timeout, DNS)
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Socket I/O errors on the persistent connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake errors
    #[error("TLS error: {message}")]
    Tls { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error object returned inside a JSON-RPC envelope
    #[error("{0}")]
    Rpc(Box<RpcFailure>),

    /// Request cancelled before dispatch
    #[error("Operation was cancelled: {operation}")]
    Cancelled { operation: String },

    /// Unexpected message shape on the persistent connection
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Connection dropped while a reply was pending
    #[error("Disconnected")]
    Disconnected,

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// `connect` called while connected or connecting
    #[error("Already connected or connecting")]
    AlreadyConnected,

    /// Login result carried a non-success code
    #[error("Login failed (code {code}): {description}")]
    LoginFailed { code: i64, description: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an API status error
    pub fn api(status: u16, reason: impl Into<String>) -> Self {
        Self::Api {
            status,
            reason: reason.into(),
        }
    }

    /// Create a TLS error
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a login failure
    pub fn login_failed(code: i64, description: impl Into<String>) -> Self {
        Self::LoginFailed {
            code,
            description: description.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status carried by an API error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// JSON-RPC error payload, if this is one
    pub fn rpc(&self) -> Option<&RpcFailure> {
        match self {
            Error::Rpc(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether the failure is routed through the retry protocol
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Api { .. } | Error::Transport(_) | Error::Io(_) | Error::Tls { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::Api { .. } => "api",
            Error::Transport(_) => "transport",
            Error::Io(_) => "io",
            Error::Tls { .. } => "tls",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Rpc(_) => "rpc",
            Error::Cancelled { .. } => "cancelled",
            Error::Protocol { .. } => "protocol",
            Error::Disconnected => "disconnected",
            Error::NotConnected => "not_connected",
            Error::AlreadyConnected => "already_connected",
            Error::LoginFailed { .. } => "login",
            Error::Config { .. } => "config",
        }
    }
}

impl From<RpcFailure> for Error {
    fn from(failure: RpcFailure) -> Self {
        Error::Rpc(Box::new(failure))
    }
}

/// Error object of a JSON-RPC response, kept together with the request that
/// produced it and the connection it was sent over.
#[derive(Debug, Clone, Serialize)]
pub struct RpcFailure {
    /// Error code reported by the wallet
    pub code: i64,
    /// Error message reported by the wallet
    pub message: String,
    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The JSON-RPC request body that failed
    pub request: Value,
    /// Connection the request was sent over
    pub context: ConnectionContext,
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}: {}", self.code, self.message)?;
        match &self.data {
            Some(Value::String(s)) => write!(f, " {}", s),
            Some(data) => write!(f, " {}", data),
            None => Ok(()),
        }
    }
}
