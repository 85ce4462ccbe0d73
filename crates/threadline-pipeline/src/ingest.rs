// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upload ingestion: fetch the export, store the chat, link the upload.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use threadline_core::{ItemProcessor, ObjectStore, ThreadlineError};
use threadline_storage::queries::{chats, uploads};
use threadline_storage::{Database, NewChat, PendingUpload};
use tracing::{info, warn};

use crate::telegram;

pub struct IngestionProcessor {
    db: Database,
    objects: Arc<dyn ObjectStore>,
    bucket: String,
}

impl IngestionProcessor {
    pub fn new(db: Database, objects: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            db,
            objects,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ItemProcessor<PendingUpload> for IngestionProcessor {
    async fn process(&self, upload: &PendingUpload) -> Result<(), ThreadlineError> {
        let bytes = self.objects.get(&self.bucket, &upload.object_key).await?;

        let export = match upload.source_kind.as_str() {
            "telegram" => telegram::parse_export(&bytes)?,
            other => {
                return Err(ThreadlineError::Parse(format!(
                    "unsupported upload source `{other}`"
                )));
            }
        };
        if export.skipped > 0 {
            warn!(
                upload.id = upload.id,
                skipped = export.skipped,
                "skipped service and empty messages"
            );
        }

        let message_count = export.messages.len();
        let chat_id = chats::save_export(
            &self.db,
            NewChat {
                internal_code: export.chat_code,
                name: export.name,
                source_kind: upload.source_kind.clone(),
                created_by: upload.user_id,
            },
            export.users,
            export.messages,
        )
        .await?;
        uploads::mark_processed(&self.db, upload.id, chat_id, Utc::now()).await?;

        info!(
            upload.id = upload.id,
            chat.id = chat_id,
            messages = message_count,
            "upload ingested"
        );
        Ok(())
    }
}
