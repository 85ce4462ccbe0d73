// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for the pipeline tables.

use serde::{Deserialize, Serialize};
use threadline_core::WorkItem;

/// A registered user and the AI keys they brought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// An uploaded export file awaiting ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub id: i64,
    pub user_id: i64,
    /// Key of the export inside the upload bucket.
    pub object_key: String,
    pub source_kind: String,
}

impl WorkItem for PendingUpload {
    fn id(&self) -> i64 {
        self.id
    }
}

/// A chat awaiting segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChat {
    pub id: i64,
    pub name: String,
    pub created_by: Option<i64>,
    /// The creator's key for the configured source, when a source filter is set.
    pub api_key: Option<String>,
}

impl WorkItem for PendingChat {
    fn id(&self) -> i64 {
        self.id
    }
}

/// A message group awaiting its embedding, with the text to embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGroup {
    pub id: i64,
    pub chat_id: i64,
    pub owner_id: Option<i64>,
    pub title: String,
    pub summary: String,
    pub messages: Vec<String>,
}

impl PendingGroup {
    /// Title, summary and messages, one per line.
    pub fn embedding_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.messages.len() + 2);
        lines.push(self.title.as_str());
        lines.push(self.summary.as_str());
        lines.extend(self.messages.iter().map(String::as_str));
        lines.join("\n")
    }
}

impl WorkItem for PendingGroup {
    fn id(&self) -> i64 {
        self.id
    }
}

/// Chat header parsed from an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChat {
    pub internal_code: String,
    pub name: String,
    pub source_kind: String,
    pub created_by: i64,
}

/// A participant as identified inside the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatUser {
    pub internal_code: String,
    pub display_name: Option<String>,
}

/// A message parsed from an export. `internal_code` is the export's own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub internal_code: i64,
    pub author_code: Option<String>,
    /// `%Y-%m-%dT%H:%M:%S`, as exported.
    pub sent_at: String,
    pub text: String,
    pub reply_to: Option<i64>,
}

/// A stored message, as fed to segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub author: Option<String>,
    pub sent_at: String,
    pub text: String,
    pub reply_to: Option<i64>,
}

/// A topic group produced by segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub chat_id: i64,
    pub internal_code: String,
    pub day: String,
    pub title: String,
    pub summary: String,
    pub message_ids: Vec<i64>,
}

/// Counts of rows per state in one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: u64,
    pub processing: u64,
    pub done: u64,
    pub error: u64,
}
