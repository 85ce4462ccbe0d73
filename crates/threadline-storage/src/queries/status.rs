// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Claim protocol and status transitions shared by every queue table.
//!
//! Every statement is scoped to an explicit id list. Nothing here updates
//! "all processing rows" except the reaper, which is bounded by its cutoff.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, ToSql, TransactionBehavior, params};
use threadline_core::state::format_timestamp;
use threadline_core::{ItemStatus, ThreadlineError, WorkItem};

use crate::database::{Database, map_tr_err};
use crate::models::StateCounts;
use crate::table::QueueTable;

/// Ids as a JSON array, for `json_each(?)`.
pub(crate) fn ids_json(ids: &[i64]) -> String {
    let joined: Vec<String> = ids.iter().map(i64::to_string).collect();
    format!("[{}]", joined.join(","))
}

/// Select and mark rows in one `BEGIN IMMEDIATE` transaction.
///
/// `select_sql` must return at most `LIMIT` eligible rows in id order. The
/// immediate transaction takes SQLite's write lock before reading, so two
/// claimers can never both see a row as pending. A claimer that finds the
/// lock held waits up to `busy_timeout` and then reads only what is left.
pub(crate) fn claim_rows<T, F>(
    conn: &mut rusqlite::Connection,
    table: QueueTable,
    select_sql: &str,
    params: &[&dyn ToSql],
    started_at: &str,
    map_row: F,
) -> rusqlite::Result<Vec<T>>
where
    T: WorkItem,
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    claim_rows_with(conn, table, select_sql, params, started_at, map_row, |_, _| Ok(()))
}

/// [`claim_rows`], with `load` filling in the claimed items before commit.
/// An error from `load` rolls the claim back.
pub(crate) fn claim_rows_with<T, F, L>(
    conn: &mut rusqlite::Connection,
    table: QueueTable,
    select_sql: &str,
    params: &[&dyn ToSql],
    started_at: &str,
    mut map_row: F,
    load: L,
) -> rusqlite::Result<Vec<T>>
where
    T: WorkItem,
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    L: FnOnce(&rusqlite::Connection, &mut [T]) -> rusqlite::Result<()>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut items = {
        let mut stmt = tx.prepare(select_sql)?;
        let rows = stmt.query_map(params, |row| map_row(row))?;
        rows.collect::<rusqlite::Result<Vec<T>>>()?
    };

    if !items.is_empty() {
        let ids: Vec<i64> = items.iter().map(WorkItem::id).collect();
        mark_processing_in(&tx, table, &ids, started_at)?;
        load(&tx, items.as_mut_slice())?;
    }
    tx.commit()?;
    Ok(items)
}

fn mark_processing_in(
    conn: &rusqlite::Connection,
    table: QueueTable,
    ids: &[i64],
    started_at: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "UPDATE {} SET meta = {} WHERE id IN (SELECT value FROM json_each(?2))",
            table.name,
            table.mark_processing_expr()
        ),
        params![started_at, ids_json(ids)],
    )
}

/// Set `processing` and `started_at`, clearing previous outcome fields.
pub async fn mark_processing(
    db: &Database,
    table: QueueTable,
    ids: &[i64],
    at: DateTime<Utc>,
) -> Result<usize, ThreadlineError> {
    let ids = ids.to_vec();
    let at = format_timestamp(at);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            mark_processing_in(conn, table, &ids, &at)
        })
        .await
        .map_err(map_tr_err)
}

/// Set `done` and `done_at`; drop any error fields.
pub async fn mark_done(
    db: &Database,
    table: QueueTable,
    ids: &[i64],
    at: DateTime<Utc>,
) -> Result<usize, ThreadlineError> {
    let ids = ids_json(ids);
    let at = format_timestamp(at);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE {} SET meta = {} WHERE id IN (SELECT value FROM json_each(?2))",
                    table.name,
                    table.mark_done_expr()
                ),
                params![at, ids],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Set `error`, `error_at` and `error_message`. `started_at` is kept.
pub async fn mark_error(
    db: &Database,
    table: QueueTable,
    ids: &[i64],
    message: &str,
    at: DateTime<Utc>,
) -> Result<usize, ThreadlineError> {
    let ids = ids_json(ids);
    let at = format_timestamp(at);
    let message = message.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE {} SET meta = {} WHERE id IN (SELECT value FROM json_each(?3))",
                    table.name,
                    table.mark_error_expr()
                ),
                params![at, message, ids],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Remove the status key. Rows without a status are counted but unchanged.
pub async fn reset(db: &Database, table: QueueTable, ids: &[i64]) -> Result<u64, ThreadlineError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let ids = ids_json(ids);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE {} SET meta = {} WHERE id IN (SELECT value FROM json_each(?1))",
                    table.name,
                    table.reset_expr()
                ),
                params![ids],
            )
        })
        .await
        .map(|n| n as u64)
        .map_err(map_tr_err)
}

/// Reset rows in `processing` whose `started_at` is before `cutoff`.
pub async fn reap_stuck(
    db: &Database,
    table: QueueTable,
    cutoff: DateTime<Utc>,
) -> Result<Vec<i64>, ThreadlineError> {
    let cutoff = format_timestamp(cutoff);
    db.connection()
        .call(move |conn| -> Result<Vec<i64>, rusqlite::Error> {
            let sql = format!(
                "UPDATE {name} SET meta = {reset}
                 WHERE json_extract(meta, '{status}') = 'processing'
                   AND (json_extract(meta, '{started}') IS NULL
                        OR json_extract(meta, '{started}') < ?1)
                 RETURNING id",
                name = table.name,
                reset = table.reset_expr(),
                status = table.path("status"),
                started = table.path("started_at"),
            );
            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params![cutoff], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Typed status of one row, or `None` if the row does not exist.
pub async fn item_status(
    db: &Database,
    table: QueueTable,
    id: i64,
) -> Result<Option<ItemStatus>, ThreadlineError> {
    let meta: Option<Option<String>> = db
        .connection()
        .call(move |conn| -> Result<Option<Option<String>>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT meta FROM {} WHERE id = ?1", table.name),
                params![id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(meta.map(|meta| table.decode(id, meta.as_deref())))
}

/// Rows per state in one queue.
pub async fn count_states(db: &Database, table: QueueTable) -> Result<StateCounts, ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<StateCounts, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT
                        COALESCE(SUM(s IS NULL OR s NOT IN ('processing', 'done', 'error')), 0),
                        COALESCE(SUM(s = 'processing'), 0),
                        COALESCE(SUM(s = 'done'), 0),
                        COALESCE(SUM(s = 'error'), 0)
                     FROM (SELECT json_extract(meta, '{}') AS s FROM {})",
                    table.path("status"),
                    table.name
                ),
                [],
                |row| {
                    Ok(StateCounts {
                        pending: row.get::<_, i64>(0)? as u64,
                        processing: row.get::<_, i64>(1)? as u64,
                        done: row.get::<_, i64>(2)? as u64,
                        error: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PendingUpload;
    use crate::queries::{uploads, users};

    fn upload_sql() -> String {
        format!(
            "SELECT u.id, u.user_id, u.object_key, u.source_kind FROM chat_uploads u
             WHERE {} ORDER BY u.id LIMIT ?1",
            QueueTable::UPLOADS.pending_predicate("u")
        )
    }

    fn upload_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingUpload> {
        Ok(PendingUpload {
            id: row.get(0)?,
            user_id: row.get(1)?,
            object_key: row.get(2)?,
            source_kind: row.get(3)?,
        })
    }

    async fn seeded_db(dir: &tempfile::TempDir) -> Database {
        let db = Database::open(dir.path().join("claims.db").to_str().unwrap())
            .await
            .unwrap();
        let user = users::upsert_user(&db, "owner").await.unwrap();
        for key in ["a.json", "b.json"] {
            uploads::create_upload(&db, user, key, "telegram").await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn failed_load_rolls_back_the_claim() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir).await;
        let sql = upload_sql();
        let started_at = format_timestamp(Utc::now());

        let result = db
            .connection()
            .call(move |conn| -> Result<Vec<PendingUpload>, rusqlite::Error> {
                claim_rows_with(
                    conn,
                    QueueTable::UPLOADS,
                    &sql,
                    params![10i64],
                    &started_at,
                    upload_row,
                    |_, _| Err(rusqlite::Error::InvalidQuery),
                )
            })
            .await;

        assert!(result.is_err());
        let counts = count_states(&db, QueueTable::UPLOADS).await.unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.processing, 0);
    }

    #[tokio::test]
    async fn load_sees_claimed_items_before_commit() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir).await;
        let sql = upload_sql();
        let started_at = format_timestamp(Utc::now());

        let claimed = db
            .connection()
            .call(move |conn| -> Result<Vec<PendingUpload>, rusqlite::Error> {
                claim_rows_with(
                    conn,
                    QueueTable::UPLOADS,
                    &sql,
                    params![1i64],
                    &started_at,
                    upload_row,
                    |_, items| {
                        for item in items {
                            item.source_kind = "loaded".to_string();
                        }
                        Ok(())
                    },
                )
            })
            .await
            .unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].source_kind, "loaded");
        let counts = count_states(&db, QueueTable::UPLOADS).await.unwrap();
        assert_eq!((counts.pending, counts.processing), (1, 1));
    }
}
