// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stage processors plugged into the worker loop.
//!
//! - [`IngestionProcessor`] turns an uploaded export into a chat.
//! - [`SegmentationProcessor`] splits a chat's days into topic groups.
//! - [`EmbeddingProcessor`] embeds claimed groups, one call per owner.
//!
//! Processors never touch item status; the worker loop records outcomes.

pub mod embedding;
pub mod ingest;
pub mod object_store;
pub mod response;
pub mod segmentation;
pub mod telegram;

use std::time::Duration;

use threadline_config::model::RetryConfig;
use threadline_resilience::RetryPolicy;

pub use embedding::EmbeddingProcessor;
pub use ingest::IngestionProcessor;
pub use object_store::LocalObjectStore;
pub use segmentation::{SegmentationProcessor, SegmentationSettings};

/// Retry policy for provider calls from the `[retry]` section.
pub fn retry_policy(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.max_attempts,
        Duration::from_millis(config.base_delay_ms),
        config.backoff_factor,
        config.jitter,
    )
}
