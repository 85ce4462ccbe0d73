// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upload queue: export files registered for ingestion.

use chrono::{DateTime, Utc};
use rusqlite::params;
use threadline_core::ThreadlineError;
use threadline_core::state::format_timestamp;

use crate::database::{Database, map_tr_err};
use crate::models::PendingUpload;
use crate::queries::status::claim_rows;
use crate::table::QueueTable;

/// Register an uploaded file. The row starts pending.
pub async fn create_upload(
    db: &Database,
    user_id: i64,
    object_key: &str,
    source_kind: &str,
) -> Result<i64, ThreadlineError> {
    let object_key = object_key.to_string();
    let source_kind = source_kind.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO chat_uploads (user_id, object_key, source_kind) VALUES (?1, ?2, ?3)",
                params![user_id, object_key, source_kind],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` unprocessed uploads.
pub async fn claim_pending(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<PendingUpload>, ThreadlineError> {
    let table = QueueTable::UPLOADS;
    let sql = format!(
        "SELECT u.id, u.user_id, u.object_key, u.source_kind
         FROM chat_uploads u
         WHERE u.processed_at IS NULL AND {}
         ORDER BY u.id
         LIMIT ?1",
        table.pending_predicate("u")
    );
    let started_at = format_timestamp(now);
    let limit = limit as i64;
    db.connection()
        .call(move |conn| -> Result<Vec<PendingUpload>, rusqlite::Error> {
            claim_rows(conn, table, &sql, params![limit], &started_at, |row| {
                Ok(PendingUpload {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    object_key: row.get(2)?,
                    source_kind: row.get(3)?,
                })
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Record the chat an upload produced.
pub async fn mark_processed(
    db: &Database,
    upload_id: i64,
    chat_id: i64,
    at: DateTime<Utc>,
) -> Result<(), ThreadlineError> {
    let at = format_timestamp(at);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE chat_uploads SET processed_at = ?1, chat_id = ?2 WHERE id = ?3",
                params![at, chat_id, upload_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// `(processed_at, chat_id)` of an upload.
pub async fn processed_state(
    db: &Database,
    upload_id: i64,
) -> Result<(Option<String>, Option<i64>), ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<(Option<String>, Option<i64>), rusqlite::Error> {
            conn.query_row(
                "SELECT processed_at, chat_id FROM chat_uploads WHERE id = ?1",
                params![upload_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
        })
        .await
        .map_err(map_tr_err)
}
