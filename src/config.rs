//! Configuration module for the JMAP connection and server settings
//!
//! All configuration is loaded from environment variables prefixed with
//! `JMAP_`. A `.env` file is honored by the entry point before loading.

use std::env;
use std::env::VarError;

use reqwest::Url;
use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

/// Server-wide configuration
///
/// Consumed once at startup. The bearer token is stored using
/// `SecretString` to prevent accidental logging.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// JMAP session resource URL
    pub session_url: Url,
    /// Bearer credential sent on every request
    pub bearer_token: SecretString,
    /// Pre-resolved account id; discovered from the session when absent
    pub account_id: Option<String>,
    /// Whether mutating email tools (mark, move, delete) are omitted
    pub read_only: bool,
    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// HTTP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if required environment variables are missing
    /// or malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// JMAP_SESSION_URL=https://api.fastmail.com/jmap/session
    /// JMAP_BEARER_TOKEN=fmu1-...
    /// JMAP_ACCOUNT_ID=u1234abcd
    /// JMAP_READ_ONLY=true
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let session_url = parse_session_url(&required_env("JMAP_SESSION_URL")?)?;
        let bearer_token = SecretString::new(required_env("JMAP_BEARER_TOKEN")?.into());

        Ok(Self {
            session_url,
            bearer_token,
            account_id: optional_env("JMAP_ACCOUNT_ID")?,
            read_only: parse_bool_env("JMAP_READ_ONLY", false)?,
            request_timeout_ms: parse_u64_env("JMAP_REQUEST_TIMEOUT_MS", 30_000)?,
            connect_timeout_ms: parse_u64_env("JMAP_CONNECT_TIMEOUT_MS", 10_000)?,
        })
    }
}

/// Parse and check the session URL scheme
fn parse_session_url(raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        AppError::invalid(format!("invalid JMAP_SESSION_URL '{raw}': {e}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::invalid(format!(
            "JMAP_SESSION_URL must use http or https, got '{other}'"
        ))),
    }
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::invalid(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Read an optional environment variable; blank values count as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::invalid(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set to an unrecognized value.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match env::var(key) {
        Ok(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::invalid(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::invalid(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<u64>().map_err(|_| {
            AppError::invalid(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::invalid(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}
