// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Threadline pipeline.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Threadline crates.
#[derive(Debug, Error)]
pub enum ThreadlineError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Non-transient provider errors (bad request, unknown model, malformed reply).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network failures and 5xx responses. Retried with exponential backoff.
    #[error("transient error: {message}")]
    Transient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// HTTP 429. `retry_after` carries the server-suggested delay when one was sent.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Account quota is used up. Never retried.
    #[error("quota exhausted: {message}")]
    QuotaExhausted { message: String },

    /// Object store read failures.
    #[error("object store error for `{key}`: {source}")]
    ObjectStore {
        key: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed payloads (export files, model output).
    #[error("parse error: {0}")]
    Parse(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// How the retry wrapper should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Retry on the exponential schedule.
    Backoff,
    /// Retry after the given server-suggested delay; the schedule does not advance.
    After(Duration),
    /// Stop immediately, regardless of attempts left.
    Abort,
    /// Not a retryable error; propagate on first occurrence.
    Fatal,
}

impl ThreadlineError {
    /// Classify this error for the retry wrapper.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transient { .. } | Self::Timeout { .. } => RetryClass::Backoff,
            Self::RateLimited {
                retry_after: Some(delay),
                ..
            } => RetryClass::After(*delay),
            Self::RateLimited {
                retry_after: None, ..
            } => RetryClass::Backoff,
            Self::QuotaExhausted { .. } => RetryClass::Abort,
            _ => RetryClass::Fatal,
        }
    }

    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }
}

impl From<serde_json::Error> for ThreadlineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_with_delay_retries_after_delay() {
        let err = ThreadlineError::RateLimited {
            message: "429".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(err.retry_class(), RetryClass::After(Duration::from_secs(5)));
    }

    #[test]
    fn rate_limit_without_delay_uses_backoff() {
        let err = ThreadlineError::RateLimited {
            message: "429".into(),
            retry_after: None,
        };
        assert_eq!(err.retry_class(), RetryClass::Backoff);
    }

    #[test]
    fn quota_aborts_and_parse_is_fatal() {
        let quota = ThreadlineError::QuotaExhausted {
            message: "insufficient_quota".into(),
        };
        assert_eq!(quota.retry_class(), RetryClass::Abort);
        assert_eq!(
            ThreadlineError::Parse("x".into()).retry_class(),
            RetryClass::Fatal
        );
    }
}
