// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp-directory database harness and seeding helpers.

use std::path::PathBuf;

use tempfile::TempDir;
use threadline_core::ThreadlineError;
use threadline_storage::queries::{chats, groups, users};
use threadline_storage::{Database, NewChat, NewChatUser, NewGroup, NewMessage};

/// A migrated database that lives as long as the value.
pub struct TestDb {
    pub db: Database,
    pub path: PathBuf,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Result<Self, ThreadlineError> {
        let dir = TempDir::new().map_err(ThreadlineError::storage)?;
        let path = dir.path().join("threadline.db");
        let db = Database::open(&path.to_string_lossy()).await?;
        Ok(Self {
            db,
            path,
            _dir: dir,
        })
    }

    /// A second, independent connection to the same file.
    pub async fn reopen(&self) -> Result<Database, ThreadlineError> {
        Database::open(&self.path.to_string_lossy()).await
    }

    pub async fn user(&self, username: &str) -> Result<i64, ThreadlineError> {
        users::upsert_user(&self.db, username).await
    }

    /// A chat owned by `owner` with one author posting `texts` on `day`
    /// (`YYYY-MM-DD`), one minute apart.
    pub async fn chat_with_messages(
        &self,
        owner: i64,
        code: &str,
        day: &str,
        texts: &[&str],
    ) -> Result<i64, ThreadlineError> {
        let messages = texts
            .iter()
            .enumerate()
            .map(|(i, text)| NewMessage {
                internal_code: i as i64 + 1,
                author_code: Some("user1".to_string()),
                sent_at: format!("{day}T10:{:02}:00", i % 60),
                text: text.to_string(),
                reply_to: None,
            })
            .collect();
        chats::save_export(
            &self.db,
            NewChat {
                internal_code: code.to_string(),
                name: format!("chat {code}"),
                source_kind: "telegram".to_string(),
                created_by: owner,
            },
            vec![NewChatUser {
                internal_code: "user1".to_string(),
                display_name: Some("Alice".to_string()),
            }],
            messages,
        )
        .await
    }

    /// `count` chats, each with a single message, returning their ids.
    pub async fn chats(&self, owner: i64, count: usize) -> Result<Vec<i64>, ThreadlineError> {
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            ids.push(
                self.chat_with_messages(owner, &format!("seed-{n}"), "2025-01-01", &["hello"])
                    .await?,
            );
        }
        Ok(ids)
    }

    /// One group per title inside `chat_id`, without message links.
    pub async fn groups(&self, chat_id: i64, titles: &[&str]) -> Result<Vec<i64>, ThreadlineError> {
        let new_groups = titles
            .iter()
            .map(|title| NewGroup {
                chat_id,
                internal_code: format!("{chat_id}-{title}"),
                day: "2025-01-01".to_string(),
                title: title.to_string(),
                summary: format!("about {title}"),
                message_ids: Vec::new(),
            })
            .collect();
        groups::save_groups(&self.db, new_groups).await
    }
}
