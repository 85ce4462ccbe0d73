// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chats, their participants and messages.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rusqlite::params;
use threadline_core::state::format_timestamp;
use threadline_core::{AiSource, ThreadlineError};

use crate::database::{Database, map_tr_err};
use crate::models::{ChatMessage, NewChat, NewChatUser, NewMessage, PendingChat};
use crate::queries::status::claim_rows;
use crate::table::QueueTable;

/// Eligibility narrowing for the segmentation queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatFilter {
    /// Source whose key is looked up on the creator.
    pub source: Option<AiSource>,
    /// Skip chats whose creator has no key for `source`.
    pub only_with_keys: bool,
}

/// Write a parsed export in one transaction and return the chat id.
///
/// Re-importing an existing chat adds the new messages and puts the chat
/// back in the segmentation queue. Already stored messages are left as is.
/// A chat that is being segmented keeps its claim and is queued again once
/// that pass is marked done.
pub async fn save_export(
    db: &Database,
    chat: NewChat,
    users: Vec<NewChatUser>,
    messages: Vec<NewMessage>,
) -> Result<i64, ThreadlineError> {
    let requeue = QueueTable::CHATS.requeue_expr();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            let tx = conn.transaction()?;
            let chat_id: i64 = tx.query_row(
                &format!(
                    "INSERT INTO chats (internal_code, name, source_kind, created_by)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (internal_code) DO UPDATE SET
                        name = excluded.name,
                        meta = {requeue}
                     RETURNING id"
                ),
                params![chat.internal_code, chat.name, chat.source_kind, chat.created_by],
                |row| row.get(0),
            )?;

            let mut user_ids = HashMap::with_capacity(users.len());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO chat_users (chat_id, internal_code, display_name)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (chat_id, internal_code) DO UPDATE SET
                        display_name = COALESCE(excluded.display_name, display_name)
                     RETURNING id",
                )?;
                for user in &users {
                    let id: i64 = stmt.query_row(
                        params![chat_id, user.internal_code, user.display_name],
                        |row| row.get(0),
                    )?;
                    user_ids.insert(user.internal_code.clone(), id);
                }
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO chat_messages
                        (chat_id, chat_user_id, internal_code, sent_at, day, message, reply_to)
                     VALUES (?1, ?2, ?3, ?4, substr(?4, 1, 10), ?5, ?6)
                     ON CONFLICT (chat_id, internal_code) DO NOTHING",
                )?;
                for message in &messages {
                    let author = message
                        .author_code
                        .as_ref()
                        .and_then(|code| user_ids.get(code));
                    stmt.execute(params![
                        chat_id,
                        author,
                        message.internal_code,
                        message.sent_at,
                        message.text,
                        message.reply_to
                    ])?;
                }
            }

            tx.commit()?;
            Ok(chat_id)
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` chats for segmentation.
pub async fn claim_pending(
    db: &Database,
    limit: usize,
    filter: ChatFilter,
    now: DateTime<Utc>,
) -> Result<Vec<PendingChat>, ThreadlineError> {
    let table = QueueTable::CHATS;
    let key_filter = if filter.only_with_keys && filter.source.is_some() {
        "AND json_extract(u.api_keys, ?2) IS NOT NULL"
    } else {
        ""
    };
    let sql = format!(
        "SELECT c.id, c.name, c.created_by, json_extract(u.api_keys, ?2)
         FROM chats c
         LEFT JOIN users u ON u.id = c.created_by
         WHERE {} {key_filter}
         ORDER BY c.id
         LIMIT ?1",
        table.pending_predicate("c")
    );
    let key_path = filter.source.map(|source| format!("$.{source}"));
    let started_at = format_timestamp(now);
    let limit = limit as i64;
    db.connection()
        .call(move |conn| -> Result<Vec<PendingChat>, rusqlite::Error> {
            claim_rows(conn, table, &sql, params![limit, key_path], &started_at, |row| {
                Ok(PendingChat {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_by: row.get(2)?,
                    api_key: row.get(3)?,
                })
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Message counts per day, oldest first.
pub async fn message_days(db: &Database, chat_id: i64) -> Result<Vec<(String, usize)>, ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<Vec<(String, usize)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT day, COUNT(*) FROM chat_messages WHERE chat_id = ?1
                 GROUP BY day ORDER BY day",
            )?;
            let days = stmt
                .query_map(params![chat_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(days)
        })
        .await
        .map_err(map_tr_err)
}

/// Days that already have at least one group.
pub async fn segmented_days(db: &Database, chat_id: i64) -> Result<BTreeSet<String>, ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<BTreeSet<String>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT DISTINCT day FROM message_groups WHERE chat_id = ?1")?;
            let days = stmt
                .query_map(params![chat_id], |row| row.get(0))?
                .collect::<rusqlite::Result<BTreeSet<String>>>()?;
            Ok(days)
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of one day in send order.
pub async fn messages_for_day(
    db: &Database,
    chat_id: i64,
    day: &str,
) -> Result<Vec<ChatMessage>, ThreadlineError> {
    let day = day.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ChatMessage>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT m.id, COALESCE(u.display_name, u.internal_code), m.sent_at, m.message,
                        r.id
                 FROM chat_messages m
                 LEFT JOIN chat_users u ON u.id = m.chat_user_id
                 LEFT JOIN chat_messages r
                    ON r.chat_id = m.chat_id AND r.internal_code = m.reply_to
                 WHERE m.chat_id = ?1 AND m.day = ?2
                 ORDER BY m.sent_at, m.id",
            )?;
            let messages = stmt
                .query_map(params![chat_id, day], |row| {
                    Ok(ChatMessage {
                        id: row.get(0)?,
                        author: row.get(1)?,
                        sent_at: row.get(2)?,
                        text: row.get(3)?,
                        reply_to: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}
