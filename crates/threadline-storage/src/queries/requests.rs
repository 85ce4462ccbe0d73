// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token usage of outbound AI requests.

use rusqlite::params;
use threadline_core::{ThreadlineError, TokenUsage};

use crate::database::{Database, map_tr_err};

pub async fn record_usage(
    db: &Database,
    kind: &str,
    user_id: Option<i64>,
    model: &str,
    usage: TokenUsage,
) -> Result<(), ThreadlineError> {
    let kind = kind.to_string();
    let model = model.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO requests (kind, user_id, model, input_tokens, output_tokens, total_tokens)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    kind,
                    user_id,
                    model,
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.total_tokens
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Total tokens recorded for `kind`.
pub async fn total_tokens(db: &Database, kind: &str) -> Result<u64, ThreadlineError> {
    let kind = kind.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COALESCE(SUM(total_tokens), 0) FROM requests WHERE kind = ?1",
                params![kind],
                |row| row.get(0),
            )
        })
        .await
        .map(|n| n as u64)
        .map_err(map_tr_err)
}
