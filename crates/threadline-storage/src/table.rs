// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Where each queue keeps its status, and the SQL that reads and writes it.
//!
//! Status lives in the JSON `meta` column. Groups share that column with
//! other metadata, so their keys carry an `embeddings_` prefix. Everything
//! above this module works with [`ItemState`] and never sees key names.

use serde_json::Value;
use threadline_core::state::parse_timestamp;
use threadline_core::{ItemState, ItemStatus, Stage, StatusTimestamps};

/// A table used as a job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTable {
    pub name: &'static str,
    pub key_prefix: &'static str,
    pub stage: Stage,
}

impl QueueTable {
    pub const UPLOADS: QueueTable = QueueTable {
        name: "chat_uploads",
        key_prefix: "",
        stage: Stage::Ingestion,
    };

    pub const CHATS: QueueTable = QueueTable {
        name: "chats",
        key_prefix: "",
        stage: Stage::Segmentation,
    };

    pub const GROUPS: QueueTable = QueueTable {
        name: "message_groups",
        key_prefix: "embeddings_",
        stage: Stage::Embedding,
    };

    pub fn for_stage(stage: Stage) -> QueueTable {
        match stage {
            Stage::Ingestion => Self::UPLOADS,
            Stage::Segmentation => Self::CHATS,
            Stage::Embedding => Self::GROUPS,
        }
    }

    /// Metadata key for `field`, with this table's prefix.
    pub fn key(&self, field: &str) -> String {
        format!("{}{field}", self.key_prefix)
    }

    /// JSON path for `field`.
    pub fn path(&self, field: &str) -> String {
        format!("$.{}", self.key(field))
    }

    /// `status` absent or not in {processing, done}. Error rows stay eligible.
    pub fn pending_predicate(&self, alias: &str) -> String {
        let status = self.path("status");
        format!(
            "(json_extract({alias}.meta, '{status}') IS NULL \
             OR json_extract({alias}.meta, '{status}') NOT IN ('processing', 'done'))"
        )
    }

    /// New `meta` for a claimed row. `?1` is the start timestamp. The claim
    /// sees the row as it is now, so any re-queue request is consumed.
    pub(crate) fn mark_processing_expr(&self) -> String {
        format!(
            "json_set(json_remove(COALESCE(meta, '{{}}'), '{done}', '{err_at}', '{err_msg}', '{requeue}'), \
             '{status}', 'processing', '{started}', ?1)",
            requeue = self.path("requeue"),
            done = self.path("done_at"),
            err_at = self.path("error_at"),
            err_msg = self.path("error_message"),
            status = self.path("status"),
            started = self.path("started_at"),
        )
    }

    /// New `meta` for a finished row. `?1` is the completion timestamp. A
    /// row re-queued while it was processing goes back to pending instead.
    pub(crate) fn mark_done_expr(&self) -> String {
        format!(
            "CASE WHEN json_extract(meta, '{requeue}') IS NOT NULL \
             THEN json_remove(meta, '{status}', '{requeue}', '{err_at}', '{err_msg}') \
             ELSE json_set(json_remove(COALESCE(meta, '{{}}'), '{err_at}', '{err_msg}'), \
             '{status}', 'done', '{done}', ?1) END",
            requeue = self.path("requeue"),
            err_at = self.path("error_at"),
            err_msg = self.path("error_message"),
            status = self.path("status"),
            done = self.path("done_at"),
        )
    }

    /// New `meta` for a row whose input changed. A row being processed keeps
    /// its claim and is flagged for another pass; any other row is pending.
    pub(crate) fn requeue_expr(&self) -> String {
        format!(
            "CASE WHEN json_extract(meta, '{status}') = 'processing' \
             THEN json_set(meta, '{requeue}', 1) \
             ELSE json_remove(meta, '{status}') END",
            status = self.path("status"),
            requeue = self.path("requeue"),
        )
    }

    /// New `meta` for a failed row. `?1` is the timestamp, `?2` the message.
    pub(crate) fn mark_error_expr(&self) -> String {
        format!(
            "json_set(COALESCE(meta, '{{}}'), '{status}', 'error', '{err_at}', ?1, '{err_msg}', ?2)",
            status = self.path("status"),
            err_at = self.path("error_at"),
            err_msg = self.path("error_message"),
        )
    }

    /// New `meta` with only the status key removed.
    pub(crate) fn reset_expr(&self) -> String {
        format!("json_remove(meta, '{}')", self.path("status"))
    }

    /// Decode a row's `meta` into its typed status. Malformed or missing
    /// metadata reads as pending.
    pub fn decode(&self, id: i64, meta: Option<&str>) -> ItemStatus {
        let doc: Value = meta
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(Value::Null);
        let text = |field: &str| doc.get(self.key(field)).and_then(Value::as_str);
        let instant = |field: &str| text(field).and_then(parse_timestamp);

        ItemStatus {
            id,
            state: ItemState::from_parts(
                text("status"),
                text("error_message").map(str::to_string),
            ),
            timestamps: StatusTimestamps {
                started_at: instant("started_at"),
                done_at: instant("done_at"),
                error_at: instant("error_at"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn group_keys_are_prefixed() {
        assert_eq!(QueueTable::GROUPS.path("status"), "$.embeddings_status");
        assert_eq!(QueueTable::CHATS.path("status"), "$.status");
    }

    #[test]
    fn decodes_error_with_timestamps() {
        let meta = r#"{"embeddings_status":"error","embeddings_error_message":"boom",
            "embeddings_started_at":"2026-03-01T10:00:00.000Z",
            "embeddings_error_at":"2026-03-01T10:00:02.500Z","status":"done"}"#;
        let status = QueueTable::GROUPS.decode(7, Some(meta));
        assert_eq!(status.state, ItemState::Error("boom".into()));
        assert!(status.timestamps.started_at.is_some());
        assert!(status.timestamps.error_at.is_some());
        assert!(status.timestamps.done_at.is_none());
    }

    #[test]
    fn missing_or_broken_meta_is_pending() {
        assert_eq!(QueueTable::CHATS.decode(1, None).state, ItemState::Pending);
        assert_eq!(
            QueueTable::CHATS.decode(1, Some("not json")).state,
            ItemState::Pending
        );
    }

    proptest! {
        #[test]
        fn only_known_statuses_leave_pending(status in "[a-z_-]{0,12}") {
            let meta = serde_json::json!({ "status": status }).to_string();
            let state = QueueTable::UPLOADS.decode(1, Some(&meta)).state;
            let expected_pending = !matches!(status.as_str(), "processing" | "done" | "error");
            prop_assert_eq!(state == ItemState::Pending, expected_pending);
        }
    }
}
