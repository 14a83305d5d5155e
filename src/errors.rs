//! Application error model and error text formatting
//!
//! Defines a closed error taxonomy using `thiserror` and the formatting
//! functions that turn any failure into the human-readable text placed in a
//! tool's response envelope.

use serde_json::Value;
use thiserror::Error;

/// Application error type
///
/// Covers every failure a tool invocation or startup step may hit. Partial
/// failures of batched mutations are not errors; they are reported as data.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (schema bound, format, or type violation)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Tool-specific precondition violated before any network call
    #[error("{0}")]
    Precondition(String),
    /// Referenced record does not exist on the server
    #[error("not found: {0}")]
    NotFound(String),
    /// Authentication failure (HTTP 401/403 from the JMAP server)
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// HTTP request timed out
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// JMAP server rejected the call, or the transport failed
    #[error("{0}")]
    Remote(String),
    /// Internal error (unexpected response shape, serialization failure)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build a `Remote` error from a JMAP method-level error response
    ///
    /// The arguments of an `["error", {...}, id]` invocation carry a `type`
    /// and an optional `description`.
    pub fn method_error(method: &str, arguments: &Value) -> Self {
        let kind = arguments
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("serverFail");
        match arguments.get("description").and_then(Value::as_str) {
            Some(description) => Self::Remote(format!("{method} failed ({kind}): {description}")),
            None => Self::Remote(format!("{method} failed ({kind})")),
        }
    }

    /// Stable machine-readable code for logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Precondition(_) => "precondition",
            Self::NotFound(_) => "not_found",
            Self::AuthFailed(_) => "auth_failed",
            Self::Timeout(_) => "timeout",
            Self::Remote(_) => "remote",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failure: {e}"))
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;

/// Format an application error for inclusion in a tool response
pub fn format_error(err: &AppError) -> String {
    err.to_string()
}

/// Format a per-id failure reason reported by the JMAP server
///
/// A `SetError` object yields its `description` when present. Any other
/// non-null value yields its JSON serialization, and `null` yields a fixed
/// fallback. Never fails.
pub fn format_reason(reason: &Value) -> String {
    if let Some(description) = reason.get("description").and_then(Value::as_str) {
        return description.to_owned();
    }
    match reason {
        Value::Null => "unknown error".to_owned(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}
