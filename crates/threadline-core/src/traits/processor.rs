// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stage processors invoked by the worker loop.

use async_trait::async_trait;

use crate::error::ThreadlineError;

/// Processes claimed items one at a time. An `Err` marks only that item.
#[async_trait]
pub trait ItemProcessor<I>: Send + Sync {
    async fn process(&self, item: &I) -> Result<(), ThreadlineError>;
}

/// Processes a whole claimed batch in one call. An `Err` applies to every item.
#[async_trait]
pub trait BatchProcessor<I>: Send + Sync {
    async fn process_batch(&self, items: &[I]) -> Result<(), ThreadlineError>;
}
