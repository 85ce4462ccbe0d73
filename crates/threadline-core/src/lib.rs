// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types and adapter traits for the Threadline pipeline.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: the [`ThreadlineError`] taxonomy, the per-item [`ItemState`]
//! machine, and the [`JobStore`] / processor seams that let the worker
//! loop stay ignorant of which stage it is driving.

pub mod error;
pub mod state;
pub mod traits;
pub mod types;

pub use error::{RetryClass, ThreadlineError};
pub use state::{ItemState, ItemStatus, StatusTimestamps};
pub use traits::{BatchProcessor, ItemProcessor, JobStore, ObjectStore, ProviderAdapter, WorkItem};
pub use types::{
    AiSource, BatchFailurePolicy, CompletionRequest, CompletionResponse, EmbeddingRequest,
    EmbeddingResponse, Stage, TokenUsage,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn error_variants_render_messages() {
        let errors: Vec<ThreadlineError> = vec![
            ThreadlineError::Config("bad value".into()),
            ThreadlineError::Storage {
                source: "disk full".into(),
            },
            ThreadlineError::Provider {
                message: "bad request".into(),
                source: None,
            },
            ThreadlineError::Transient {
                message: "connection reset".into(),
                source: None,
            },
            ThreadlineError::RateLimited {
                message: "slow down".into(),
                retry_after: Some(Duration::from_secs(5)),
            },
            ThreadlineError::QuotaExhausted {
                message: "monthly quota".into(),
            },
            ThreadlineError::ObjectStore {
                key: "uploads/a.json".into(),
                source: "missing".into(),
            },
            ThreadlineError::Parse("not json".into()),
            ThreadlineError::Timeout {
                duration: Duration::from_secs(30),
            },
            ThreadlineError::Internal("oops".into()),
        ];

        for err in &errors {
            assert!(!err.to_string().is_empty());
        }
        assert_eq!(errors[5].to_string(), "quota exhausted: monthly quota");
    }
}
