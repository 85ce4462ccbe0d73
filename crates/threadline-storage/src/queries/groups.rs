// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message groups and their embeddings.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use threadline_core::ThreadlineError;
use threadline_core::state::format_timestamp;

use crate::database::{Database, map_tr_err};
use crate::models::{NewGroup, PendingGroup};
use crate::queries::status::claim_rows_with;
use crate::table::QueueTable;

/// Store groups and their message links. Groups are keyed by
/// `internal_code`, so saving the same segmentation twice is harmless.
pub async fn save_groups(db: &Database, groups: Vec<NewGroup>) -> Result<Vec<i64>, ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<Vec<i64>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut ids = Vec::with_capacity(groups.len());
            {
                let mut insert = tx.prepare(
                    "INSERT INTO message_groups (chat_id, internal_code, day, title, summary)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (internal_code) DO UPDATE SET
                        title = excluded.title,
                        summary = excluded.summary
                     RETURNING id",
                )?;
                let mut link = tx.prepare(
                    "INSERT INTO message_group_messages (group_id, message_id) VALUES (?1, ?2)
                     ON CONFLICT DO NOTHING",
                )?;
                for group in &groups {
                    let id: i64 = insert.query_row(
                        params![
                            group.chat_id,
                            group.internal_code,
                            group.day,
                            group.title,
                            group.summary
                        ],
                        |row| row.get(0),
                    )?;
                    for message_id in &group.message_ids {
                        link.execute(params![id, message_id])?;
                    }
                    ids.push(id);
                }
            }
            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` groups that have no embedding yet, with their text.
pub async fn claim_pending(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<PendingGroup>, ThreadlineError> {
    let table = QueueTable::GROUPS;
    let sql = format!(
        "SELECT g.id, g.chat_id, c.created_by, g.title, g.summary
         FROM message_groups g
         JOIN chats c ON c.id = g.chat_id
         WHERE {}
           AND NOT EXISTS (SELECT 1 FROM group_embeddings e WHERE e.group_id = g.id)
         ORDER BY g.id
         LIMIT ?1",
        table.pending_predicate("g")
    );
    let started_at = format_timestamp(now);
    let limit = limit as i64;
    db.connection()
        .call(move |conn| -> Result<Vec<PendingGroup>, rusqlite::Error> {
            claim_rows_with(
                conn,
                table,
                &sql,
                params![limit],
                &started_at,
                |row| {
                    Ok(PendingGroup {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        owner_id: row.get(2)?,
                        title: row.get(3)?,
                        summary: row.get(4)?,
                        messages: Vec::new(),
                    })
                },
                load_group_messages,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Message texts of each claimed group, in send order.
fn load_group_messages(conn: &rusqlite::Connection, groups: &mut [PendingGroup]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT m.message
         FROM message_group_messages gm
         JOIN chat_messages m ON m.id = gm.message_id
         WHERE gm.group_id = ?1
         ORDER BY m.sent_at, m.id",
    )?;
    for group in groups {
        group.messages = stmt
            .query_map(params![group.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
    }
    Ok(())
}

/// Store or replace the embedding of a group.
pub async fn save_embedding(
    db: &Database,
    group_id: i64,
    model: &str,
    vector: &[f32],
) -> Result<(), ThreadlineError> {
    let model = model.to_string();
    let dimensions = vector.len() as i64;
    let blob = vec_to_blob(vector);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO group_embeddings (group_id, model, dimensions, embedding)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (group_id) DO UPDATE SET
                    model = excluded.model,
                    dimensions = excluded.dimensions,
                    embedding = excluded.embedding",
                params![group_id, model, dimensions, blob],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_embedding(db: &Database, group_id: i64) -> Result<Option<Vec<f32>>, ThreadlineError> {
    let blob: Option<Vec<u8>> = db
        .connection()
        .call(move |conn| -> Result<Option<Vec<u8>>, rusqlite::Error> {
            conn.query_row(
                "SELECT embedding FROM group_embeddings WHERE group_id = ?1",
                params![group_id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(blob.map(|b| blob_to_vec(&b)))
}

/// Ids of a chat's groups in creation order.
pub async fn group_ids_for_chat(db: &Database, chat_id: i64) -> Result<Vec<i64>, ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<Vec<i64>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT id FROM message_groups WHERE chat_id = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map(params![chat_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Little-endian f32 bytes.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
