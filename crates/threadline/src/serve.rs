// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `threadline serve`, `threadline work` and `threadline reap`.
//!
//! Every worker gets its own database handle so claims from different
//! workers contend on SQLite's write lock rather than on one connection
//! thread. Processors and provider adapters are shared across a pool.

use std::sync::Arc;

use chrono::Utc;
use threadline_config::ThreadlineConfig;
use threadline_core::{ObjectStore, ProviderAdapter, Stage, ThreadlineError};
use threadline_pipeline::{
    EmbeddingProcessor, IngestionProcessor, LocalObjectStore, SegmentationProcessor,
    SegmentationSettings, retry_policy,
};
use threadline_storage::{
    ChatFilter, ChatQueue, Chats, GroupQueue, Groups, UploadQueue, Uploads,
};
use threadline_worker::{
    Processing, Reapable, Reaper, Worker, WorkerOptions, WorkerPool, install_signal_handler,
    worker_name,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::open_database;

/// Run all three stage pools, plus the reaper when enabled, until shutdown.
pub async fn run_serve(config: ThreadlineConfig) -> Result<(), ThreadlineError> {
    info!("starting threadline serve");
    let cancel = install_signal_handler();

    let pools = vec![
        spawn_pool(&config, Stage::Ingestion, cancel.clone()).await?,
        spawn_pool(&config, Stage::Segmentation, cancel.clone()).await?,
        spawn_pool(&config, Stage::Embedding, cancel.clone()).await?,
    ];

    let reaper_cancel = cancel.child_token();
    let reaper = if config.reaper.enabled {
        let reaper = build_reaper(&config).await?;
        let token = reaper_cancel.clone();
        Some(tokio::spawn(async move { reaper.run(token).await }))
    } else {
        info!("reaper disabled");
        None
    };

    let result = join_pools(pools).await;

    reaper_cancel.cancel();
    if let Some(handle) = reaper
        && let Err(e) = handle.await
    {
        error!(error = %e, "reaper task failed");
    }

    info!("threadline serve stopped");
    result
}

/// Run the pool of one stage until shutdown, or until its queue drains when
/// the stage is not configured to run forever.
pub async fn run_stage(config: ThreadlineConfig, stage: Stage) -> Result<(), ThreadlineError> {
    info!(%stage, "starting threadline work");
    let cancel = install_signal_handler();
    let pool = spawn_pool(&config, stage, cancel).await?;
    pool.join().await
}

/// One reaper pass over every queue.
pub async fn run_reap(config: &ThreadlineConfig) -> Result<(), ThreadlineError> {
    let reaper = build_reaper(config).await?;
    let reaped = reaper.reap_once(Utc::now()).await;
    if reaped.is_empty() {
        println!("threadline: no stuck items");
    }
    for (stage, ids) in reaped {
        println!("threadline: reset {} stuck {stage} item(s)", ids.len());
    }
    Ok(())
}

async fn join_pools(pools: Vec<WorkerPool>) -> Result<(), ThreadlineError> {
    let mut first_error = None;
    for pool in pools {
        if let Err(e) = pool.join().await {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Build and spawn the workers of `stage` as configured.
pub async fn spawn_pool(
    config: &ThreadlineConfig,
    stage: Stage,
    cancel: CancellationToken,
) -> Result<WorkerPool, ThreadlineError> {
    match stage {
        Stage::Ingestion => {
            let objects: Arc<dyn ObjectStore> =
                Arc::new(LocalObjectStore::new(&config.object_store.root));
            let pool_config = &config.workers.upload;
            let mut workers = Vec::with_capacity(pool_config.worker_count);
            for idx in 0..pool_config.worker_count {
                let db = open_database(config).await?;
                let processor = IngestionProcessor::new(
                    db.clone(),
                    Arc::clone(&objects),
                    config.object_store.bucket.clone(),
                );
                workers.push(Worker::new(
                    worker_name(stage, idx),
                    UploadQueue::new(db, Uploads),
                    Processing::PerItem(Arc::new(processor)),
                    WorkerOptions::from(pool_config),
                    cancel.clone(),
                ));
            }
            Ok(WorkerPool::spawn(stage, workers))
        }
        Stage::Segmentation => {
            let provider = threadline_providers::build_adapter(
                &config.providers.segmentation_model,
                &config.providers,
            )?;
            let pool_config = config.workers.segmentation.pool();
            let filter = chat_filter(config, provider.as_ref());
            let settings = SegmentationSettings::from_config(&config.providers, &config.segmentation);
            let mut workers = Vec::with_capacity(pool_config.worker_count);
            for idx in 0..pool_config.worker_count {
                let db = open_database(config).await?;
                let processor = SegmentationProcessor::new(
                    db.clone(),
                    Arc::clone(&provider),
                    retry_policy(&config.retry),
                    settings.clone(),
                );
                workers.push(Worker::new(
                    worker_name(stage, idx),
                    ChatQueue::new(db, Chats(filter)),
                    Processing::PerItem(Arc::new(processor)),
                    WorkerOptions::from(&pool_config),
                    cancel.clone(),
                ));
            }
            Ok(WorkerPool::spawn(stage, workers))
        }
        Stage::Embedding => {
            let provider = threadline_providers::build_adapter(
                &config.providers.embedding_model,
                &config.providers,
            )?;
            let pool_config = config.workers.embedding.pool();
            let mut workers = Vec::with_capacity(pool_config.worker_count);
            for idx in 0..pool_config.worker_count {
                let db = open_database(config).await?;
                let processor = EmbeddingProcessor::new(
                    db.clone(),
                    Arc::clone(&provider),
                    retry_policy(&config.retry),
                    config.providers.embedding_model.clone(),
                );
                workers.push(Worker::new(
                    worker_name(stage, idx),
                    GroupQueue::new(db, Groups),
                    Processing::Batch {
                        processor: Arc::new(processor),
                        on_failure: config.workers.embedding.failure_policy,
                    },
                    WorkerOptions::from(&pool_config),
                    cancel.clone(),
                ));
            }
            Ok(WorkerPool::spawn(stage, workers))
        }
    }
}

/// Chat eligibility for the segmentation pool. Creator keys are looked up
/// for the configured source, or the segmentation model's own source.
fn chat_filter(config: &ThreadlineConfig, provider: &dyn ProviderAdapter) -> ChatFilter {
    let workers = &config.workers.segmentation;
    ChatFilter {
        source: Some(workers.source.unwrap_or_else(|| provider.source())),
        only_with_keys: workers.only_with_keys,
    }
}

async fn build_reaper(config: &ThreadlineConfig) -> Result<Reaper, ThreadlineError> {
    let db = open_database(config).await?;
    let queues: Vec<Arc<dyn Reapable>> = vec![
        Arc::new(UploadQueue::new(db.clone(), Uploads)) as Arc<dyn Reapable>,
        Arc::new(ChatQueue::new(db.clone(), Chats(ChatFilter::default()))),
        Arc::new(GroupQueue::new(db, Groups)),
    ];
    Ok(Reaper::from_config(queues, &config.reaper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::{AiSource, ItemState};
    use threadline_storage::QueueTable;
    use threadline_storage::queries::{status, uploads, users};

    const EXPORT: &str = r#"{
        "name": "Book club",
        "id": 90210,
        "messages": [
            {"id": 1, "type": "message", "date": "2025-02-10T18:00:00",
             "from": "Ann", "from_id": "user10", "text": "Chapter 3 tonight?"},
            {"id": 2, "type": "message", "date": "2025-02-10T18:02:00",
             "from": "Ben", "from_id": "user11", "text": "Yes, after dinner"}
        ]
    }"#;

    fn test_config(dir: &std::path::Path) -> ThreadlineConfig {
        let mut config = ThreadlineConfig::default();
        config.storage.database_path = dir.join("threadline.db").display().to_string();
        config.object_store.root = dir.join("objects").display().to_string();
        config.workers.upload.worker_count = 2;
        config.workers.upload.run_forever = false;
        config.workers.upload.idle_sleep_secs = 0;
        config
    }

    #[tokio::test]
    async fn ingestion_pool_drains_queue_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let objects = LocalObjectStore::new(&config.object_store.root);
        objects
            .put(&config.object_store.bucket, "ann/result.json", EXPORT.as_bytes())
            .await
            .unwrap();
        let db = open_database(&config).await.unwrap();
        let user = users::upsert_user(&db, "ann").await.unwrap();
        let upload = uploads::create_upload(&db, user, "ann/result.json", "telegram")
            .await
            .unwrap();

        let pool = spawn_pool(&config, Stage::Ingestion, CancellationToken::new())
            .await
            .unwrap();
        pool.join().await.unwrap();

        let upload_state = status::item_status(&db, QueueTable::UPLOADS, upload)
            .await
            .unwrap()
            .unwrap()
            .state;
        assert_eq!(upload_state, ItemState::Done);
        let chats = status::count_states(&db, QueueTable::CHATS).await.unwrap();
        assert_eq!(chats.pending, 1);
    }

    #[tokio::test]
    async fn unknown_segmentation_model_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.providers.segmentation_model = "llama-local".into();

        let err = spawn_pool(&config, Stage::Segmentation, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ThreadlineError::Config(_)));
    }

    #[test]
    fn chat_filter_defaults_to_model_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        let provider = threadline_providers::build_adapter(
            &config.providers.segmentation_model,
            &config.providers,
        )
        .unwrap();

        assert_eq!(chat_filter(&config, provider.as_ref()).source, Some(AiSource::Mistral));

        config.workers.segmentation.source = Some(AiSource::Gemini);
        config.workers.segmentation.only_with_keys = true;
        let filter = chat_filter(&config, provider.as_ref());
        assert_eq!(filter.source, Some(AiSource::Gemini));
        assert!(filter.only_with_keys);
    }

    #[tokio::test]
    async fn reap_pass_on_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        run_reap(&config).await.unwrap();
    }
}
