// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP plumbing shared by the adapters: client construction and mapping of
//! transport failures and status codes onto the error taxonomy.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use threadline_core::ThreadlineError;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ThreadlineError> {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| ThreadlineError::Provider {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Failures before a status code arrived. Timeouts and connection problems
/// are worth retrying; anything else (bad URL, body encoding) is not.
pub(crate) fn send_error(e: reqwest::Error) -> ThreadlineError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ThreadlineError::Transient {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    } else {
        ThreadlineError::Provider {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

/// `Retry-After` in its delay-seconds form.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Errors for non-429 failure statuses.
pub(crate) fn status_error(status: StatusCode, body: &str) -> ThreadlineError {
    let message = format!("API returned {status}: {}", truncate(body, 500));
    if status.is_server_error() {
        ThreadlineError::Transient {
            message,
            source: None,
        }
    } else {
        ThreadlineError::Provider {
            message,
            source: None,
        }
    }
}

pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_accepts_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            ThreadlineError::Transient { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "nope"),
            ThreadlineError::Provider { .. }
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
