// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `threadline enqueue-upload`: register an export for ingestion.

use threadline_config::ThreadlineConfig;
use threadline_core::ThreadlineError;
use threadline_pipeline::LocalObjectStore;
use threadline_storage::Database;
use threadline_storage::queries::{uploads, users};
use tracing::info;

use crate::open_database;

pub async fn run_enqueue(
    config: &ThreadlineConfig,
    username: &str,
    object_key: &str,
    source_kind: &str,
) -> Result<(), ThreadlineError> {
    let objects = LocalObjectStore::new(&config.object_store.root);
    let db = open_database(config).await?;
    let upload_id = enqueue(
        &db,
        &objects,
        &config.object_store.bucket,
        username,
        object_key,
        source_kind,
    )
    .await?;
    println!("threadline: upload {upload_id} queued for ingestion");
    Ok(())
}

/// Create the upload row once the object is known to exist.
pub async fn enqueue(
    db: &Database,
    objects: &LocalObjectStore,
    bucket: &str,
    username: &str,
    object_key: &str,
    source_kind: &str,
) -> Result<i64, ThreadlineError> {
    if !objects.exists(bucket, object_key).await? {
        return Err(ThreadlineError::ObjectStore {
            key: format!("{bucket}/{object_key}"),
            source: "no such object".into(),
        });
    }
    let user_id = users::upsert_user(db, username).await?;
    let upload_id = uploads::create_upload(db, user_id, object_key, source_kind).await?;
    info!(upload.id = upload_id, user.id = user_id, object_key, "upload registered");
    Ok(upload_id)
}
