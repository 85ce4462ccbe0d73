// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`JobStore`] implementations over the three queue tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use threadline_core::{JobStore, Stage, ThreadlineError, WorkItem};

use crate::database::Database;
use crate::models::{PendingChat, PendingGroup, PendingUpload};
use crate::queries::chats::ChatFilter;
use crate::queries::{chats, groups, status, uploads};
use crate::table::QueueTable;

/// Table-specific part of a queue: which rows are eligible and what a
/// claimed item carries.
#[async_trait]
pub trait QueueKind: Send + Sync + 'static {
    type Item: WorkItem;

    const TABLE: QueueTable;

    async fn claim(
        &self,
        db: &Database,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self::Item>, ThreadlineError>;
}

/// Uploaded files not yet turned into a chat.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uploads;

#[async_trait]
impl QueueKind for Uploads {
    type Item = PendingUpload;

    const TABLE: QueueTable = QueueTable::UPLOADS;

    async fn claim(
        &self,
        db: &Database,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingUpload>, ThreadlineError> {
        uploads::claim_pending(db, limit, now).await
    }
}

/// Chats awaiting segmentation, optionally narrowed by creator keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chats(pub ChatFilter);

#[async_trait]
impl QueueKind for Chats {
    type Item = PendingChat;

    const TABLE: QueueTable = QueueTable::CHATS;

    async fn claim(
        &self,
        db: &Database,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingChat>, ThreadlineError> {
        chats::claim_pending(db, limit, self.0, now).await
    }
}

/// Groups without an embedding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Groups;

#[async_trait]
impl QueueKind for Groups {
    type Item = PendingGroup;

    const TABLE: QueueTable = QueueTable::GROUPS;

    async fn claim(
        &self,
        db: &Database,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingGroup>, ThreadlineError> {
        groups::claim_pending(db, limit, now).await
    }
}

/// A queue table behind the [`JobStore`] interface.
#[derive(Clone)]
pub struct SqliteQueue<K> {
    db: Database,
    kind: K,
}

pub type UploadQueue = SqliteQueue<Uploads>;
pub type ChatQueue = SqliteQueue<Chats>;
pub type GroupQueue = SqliteQueue<Groups>;

impl<K: QueueKind> SqliteQueue<K> {
    pub fn new(db: Database, kind: K) -> Self {
        Self { db, kind }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl<K: QueueKind> JobStore for SqliteQueue<K> {
    type Item = K::Item;

    fn stage(&self) -> Stage {
        K::TABLE.stage
    }

    async fn claim_batch(&self, limit: usize) -> Result<Vec<K::Item>, ThreadlineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.kind.claim(&self.db, limit, Utc::now()).await
    }

    async fn mark_done(&self, ids: &[i64]) -> Result<(), ThreadlineError> {
        status::mark_done(&self.db, K::TABLE, ids, Utc::now()).await?;
        Ok(())
    }

    async fn mark_error(&self, ids: &[i64], message: &str) -> Result<(), ThreadlineError> {
        status::mark_error(&self.db, K::TABLE, ids, message, Utc::now()).await?;
        Ok(())
    }

    async fn reset(&self, ids: &[i64]) -> Result<u64, ThreadlineError> {
        status::reset(&self.db, K::TABLE, ids).await
    }

    async fn reap_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, ThreadlineError> {
        status::reap_stuck(&self.db, K::TABLE, cutoff).await
    }
}
