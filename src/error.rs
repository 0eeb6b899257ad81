// src/error.rs

//! Unified error handling for the orchestrator.

use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;

use crate::batch::{Classify, ErrorKind};
use crate::utils::http;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Downstream API answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Downstream API throttled the caller (HTTP 429)
    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Call did not complete in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Vendor payload could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Work was abandoned because a stop was requested
    #[error("Cancelled")]
    Cancelled,
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an API error from a status code.
    ///
    /// 429 is mapped to [`AppError::RateLimited`] so callers never have to
    /// special-case it.
    pub fn api(status: u16, message: impl fmt::Display) -> Self {
        if status == 429 {
            return Self::rate_limited(None, message);
        }
        Self::Api {
            status,
            message: message.to_string(),
        }
    }

    /// Create an error from a non-success HTTP response.
    ///
    /// API clients call this with the response status and headers. A 429
    /// keeps the server's `Retry-After` so backoff and adaptive limiters can
    /// honor it, and 401/403 become [`AppError::Auth`].
    pub fn from_response(status: u16, headers: &HeaderMap, message: impl fmt::Display) -> Self {
        match status {
            429 => Self::rate_limited(http::retry_after(headers), message),
            401 | 403 => Self::auth(format!("HTTP {status}: {message}")),
            _ => Self::api(status, message),
        }
    }

    /// Create a rate-limit error with an optional server-provided delay.
    pub fn rate_limited(retry_after: Option<Duration>, message: impl fmt::Display) -> Self {
        Self::RateLimited {
            retry_after,
            message: message.to_string(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a parse error.
    pub fn parse(message: impl fmt::Display) -> Self {
        Self::Parse(message.to_string())
    }
}

impl Classify for AppError {
    fn kind(&self) -> ErrorKind {
        match self {
            AppError::Io(e) => http::classify_io(e),
            AppError::Http(e) => http::classify_reqwest(e),
            AppError::Api { status, .. } => http::classify_status(*status),
            AppError::RateLimited { .. } => ErrorKind::RateLimited,
            AppError::Timeout(_) => ErrorKind::Transient,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::Json(_)
            | AppError::Toml(_)
            | AppError::Config(_)
            | AppError::Validation(_)
            | AppError::Auth(_)
            | AppError::Parse(_) => ErrorKind::Fatal,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_429_becomes_rate_limited() {
        let err = AppError::api(429, "slow down");
        assert!(matches!(err, AppError::RateLimited { .. }));
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[test]
    fn classify_taxonomy() {
        assert_eq!(AppError::api(503, "unavailable").kind(), ErrorKind::Transient);
        assert_eq!(AppError::api(404, "missing").kind(), ErrorKind::Fatal);
        assert_eq!(AppError::timeout("read").kind(), ErrorKind::Transient);
        assert_eq!(AppError::auth("bad key").kind(), ErrorKind::Fatal);
        assert_eq!(AppError::parse("no field").kind(), ErrorKind::Fatal);
        assert_eq!(AppError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn retry_after_is_exposed() {
        let err = AppError::rate_limited(Some(Duration::from_secs(3)), "429");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(AppError::timeout("x").retry_after(), None);
    }

    #[test]
    fn from_response_keeps_retry_after() {
        use reqwest::header::{HeaderValue, RETRY_AFTER};

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        let limited = AppError::from_response(429, &headers, "quota");
        assert_eq!(limited.kind(), ErrorKind::RateLimited);
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));

        let empty = HeaderMap::new();
        assert_eq!(AppError::from_response(429, &empty, "quota").retry_after(), None);
        assert!(matches!(
            AppError::from_response(403, &headers, "forbidden"),
            AppError::Auth(_)
        ));
        assert_eq!(
            AppError::from_response(502, &headers, "gateway").kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn io_errors_split_by_kind() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(AppError::from(reset).kind(), ErrorKind::Transient);
        assert_eq!(AppError::from(denied).kind(), ErrorKind::Fatal);
    }
}
