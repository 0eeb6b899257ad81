// src/utils/http.rs

//! HTTP error classification utilities.
//!
//! API collaborators build and send their own requests; these helpers only
//! map what comes back onto the retry taxonomy. Clients turn failed responses
//! into errors with `AppError::from_response`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::batch::ErrorKind;

/// Classify an HTTP status code.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimited,
        408 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Fatal,
    }
}

/// Classify a reqwest error.
pub fn classify_reqwest(error: &reqwest::Error) -> ErrorKind {
    if let Some(status) = error.status() {
        return classify_status(status.as_u16());
    }
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        return ErrorKind::Transient;
    }
    ErrorKind::Fatal
}

/// Classify an I/O error. Connection-level hiccups are worth retrying.
pub fn classify_io(error: &std::io::Error) -> ErrorKind {
    use std::io::ErrorKind as Io;

    match error.kind() {
        Io::TimedOut
        | Io::ConnectionReset
        | Io::ConnectionAborted
        | Io::ConnectionRefused
        | Io::BrokenPipe
        | Io::Interrupted
        | Io::UnexpectedEof
        | Io::WouldBlock => ErrorKind::Transient,
        _ => ErrorKind::Fatal,
    }
}

/// Read a `Retry-After` header (delta-seconds or HTTP-date).
///
/// Used by [`AppError::from_response`](crate::error::AppError::from_response).
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, Utc::now())
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    // A date in the past means "retry now".
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(429), ErrorKind::RateLimited);
        assert_eq!(classify_status(500), ErrorKind::Transient);
        assert_eq!(classify_status(502), ErrorKind::Transient);
        assert_eq!(classify_status(408), ErrorKind::Transient);
        assert_eq!(classify_status(401), ErrorKind::Fatal);
        assert_eq!(classify_status(400), ErrorKind::Fatal);
        assert_eq!(classify_status(404), ErrorKind::Fatal);
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_missing_or_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_retry_after_http_date() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2026 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2026 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2026 07:27:00 GMT", now),
            Some(Duration::ZERO)
        );
    }
}
