// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection management with PRAGMA setup and migrations.
//!
//! Each [`Database`] owns one tokio-rusqlite connection and so one
//! background thread. Several handles may point at the same file; SQLite's
//! write lock plus `busy_timeout` serializes their writers.

use std::time::Duration;

use threadline_core::ThreadlineError;

use crate::migrations::run_migrations;

/// Open options. Defaults match `[storage]` in the configuration.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseOptions {
    pub busy_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the pipeline database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` with default options.
    pub async fn open(path: &str) -> Result<Self, ThreadlineError> {
        Self::open_with(path, DatabaseOptions::default()).await
    }

    /// Open the database, run migrations on a short-lived blocking
    /// connection, then hand back an async handle.
    pub async fn open_with(path: &str, options: DatabaseOptions) -> Result<Self, ThreadlineError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(ThreadlineError::storage)?;
        }

        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), ThreadlineError> {
            let mut conn =
                rusqlite::Connection::open(&migrate_path).map_err(ThreadlineError::storage)?;
            apply_pragmas(&conn, options).map_err(ThreadlineError::storage)?;
            run_migrations(&mut conn)
        })
        .await
        .map_err(|e| ThreadlineError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(ThreadlineError::storage)?;
        conn.call(move |conn| -> Result<(), rusqlite::Error> { apply_pragmas(conn, options) })
            .await
            .map_err(map_tr_err)?;

        tracing::debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Close the connection, flushing the WAL.
    pub async fn close(self) -> Result<(), ThreadlineError> {
        self.conn.close().await.map_err(ThreadlineError::storage)
    }
}

fn apply_pragmas(conn: &rusqlite::Connection, options: DatabaseOptions) -> rusqlite::Result<()> {
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(options.busy_timeout)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Convert a tokio-rusqlite error into `ThreadlineError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ThreadlineError {
    ThreadlineError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_runs_migrations_and_is_reopenable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/pipeline.db");
        let path = path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        let tables: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('chat_uploads', 'chats', 'message_groups')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(tables, 3);
        db.close().await.unwrap();

        let again = Database::open(path).await.unwrap();
        again.close().await.unwrap();
    }
}
