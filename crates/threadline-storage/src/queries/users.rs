// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Users and their per-source API keys.

use rusqlite::{OptionalExtension, params};
use threadline_core::{AiSource, ThreadlineError};

use crate::database::{Database, map_tr_err};
use crate::models::User;

/// Insert a user, or return the existing id for `username`.
pub async fn upsert_user(db: &Database, username: &str) -> Result<i64, ThreadlineError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "INSERT INTO users (username) VALUES (?1)
                 ON CONFLICT (username) DO UPDATE SET username = excluded.username
                 RETURNING id",
                params![username],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_user(db: &Database, id: i64) -> Result<Option<User>, ThreadlineError> {
    db.connection()
        .call(move |conn| -> Result<Option<User>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, username FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Store `key` under the source's name in the user's `api_keys` document.
pub async fn set_api_key(
    db: &Database,
    user_id: i64,
    source: AiSource,
    key: &str,
) -> Result<(), ThreadlineError> {
    let path = format!("$.{source}");
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE users SET api_keys = json_set(api_keys, ?1, ?2) WHERE id = ?3",
                params![path, key, user_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn api_key(
    db: &Database,
    user_id: i64,
    source: AiSource,
) -> Result<Option<String>, ThreadlineError> {
    let path = format!("$.{source}");
    let key: Option<Option<String>> = db
        .connection()
        .call(move |conn| -> Result<Option<Option<String>>, rusqlite::Error> {
            conn.query_row(
                "SELECT json_extract(api_keys, ?1) FROM users WHERE id = ?2",
                params![path, user_id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(key.flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn keys_are_stored_per_source() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        let id = upsert_user(&db, "ana").await.unwrap();
        assert_eq!(upsert_user(&db, "ana").await.unwrap(), id);
        assert_eq!(get_user(&db, id).await.unwrap().unwrap().username, "ana");

        set_api_key(&db, id, AiSource::Mistral, "mk-1").await.unwrap();
        assert_eq!(
            api_key(&db, id, AiSource::Mistral).await.unwrap().as_deref(),
            Some("mk-1")
        );
        assert_eq!(api_key(&db, id, AiSource::Gemini).await.unwrap(), None);
        assert_eq!(api_key(&db, 999, AiSource::Mistral).await.unwrap(), None);

        db.close().await.unwrap();
    }
}
