// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable queue abstraction over one stage table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ThreadlineError;
use crate::types::Stage;

/// A claimed row. The payload is opaque to the queue.
pub trait WorkItem: Send + Sync + 'static {
    fn id(&self) -> i64;
}

/// A table acting as a durable job queue with status kept in row metadata.
///
/// Implementations carry their own eligibility filter (for example "only
/// chats whose owner has an API key for the configured source"), applied on
/// top of the pending predicate by [`claim_batch`](JobStore::claim_batch).
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    type Item: WorkItem;

    fn stage(&self) -> Stage;

    /// Select up to `limit` eligible rows in id order and mark them
    /// `processing` within one transaction. Concurrent callers never receive
    /// overlapping rows. An empty result is not an error.
    async fn claim_batch(&self, limit: usize) -> Result<Vec<Self::Item>, ThreadlineError>;

    /// Record success. Clears any error fields.
    async fn mark_done(&self, ids: &[i64]) -> Result<(), ThreadlineError>;

    /// Record failure. `started_at` is kept.
    async fn mark_error(&self, ids: &[i64], message: &str) -> Result<(), ThreadlineError>;

    /// Drop the status key so the rows read as pending again. Idempotent.
    async fn reset(&self, ids: &[i64]) -> Result<u64, ThreadlineError>;

    /// Reset rows stuck in `processing` since before `cutoff`. Returns their ids.
    async fn reap_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, ThreadlineError>;
}
