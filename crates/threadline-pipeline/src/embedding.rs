// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group embeddings, one provider call per owning user.
//!
//! The whole claimed batch succeeds or fails together: the first owner
//! whose call fails aborts the batch, and the worker applies the stage's
//! failure policy to every claimed group. Vectors already saved for other
//! owners stay saved; the groups are re-embedded on their next claim.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use threadline_core::{BatchProcessor, EmbeddingRequest, ProviderAdapter, ThreadlineError};
use threadline_resilience::{RetryPolicy, retry};
use threadline_storage::queries::{groups, requests, users};
use threadline_storage::{Database, PendingGroup};
use tracing::{debug, info};

pub const REQUEST_KIND: &str = "embedding";

pub struct EmbeddingProcessor {
    db: Database,
    provider: Arc<dyn ProviderAdapter>,
    retry: RetryPolicy,
    model: String,
}

impl EmbeddingProcessor {
    pub fn new(
        db: Database,
        provider: Arc<dyn ProviderAdapter>,
        retry: RetryPolicy,
        model: impl Into<String>,
    ) -> Self {
        Self {
            db,
            provider,
            retry,
            model: model.into(),
        }
    }

    async fn embed_for_owner(
        &self,
        owner: Option<i64>,
        batch: &[&PendingGroup],
    ) -> Result<(), ThreadlineError> {
        let api_key = match owner {
            Some(user_id) => users::api_key(&self.db, user_id, self.provider.source()).await?,
            None => None,
        };
        let request = EmbeddingRequest {
            model: self.model.clone(),
            inputs: batch.iter().map(|g| g.embedding_text()).collect(),
            api_key,
        };

        let response = retry(&self.retry, || {
            self.provider.fetch_embeddings(request.clone())
        })
        .await?;
        if response.vectors.len() != batch.len() {
            return Err(ThreadlineError::Provider {
                message: format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.vectors.len()
                ),
                source: None,
            });
        }

        for (group, vector) in batch.iter().zip(&response.vectors) {
            groups::save_embedding(&self.db, group.id, &response.model, vector).await?;
        }
        requests::record_usage(&self.db, REQUEST_KIND, owner, &response.model, response.usage)
            .await?;
        debug!(owner = ?owner, groups = batch.len(), "embeddings stored");
        Ok(())
    }
}

#[async_trait]
impl BatchProcessor<PendingGroup> for EmbeddingProcessor {
    async fn process_batch(&self, items: &[PendingGroup]) -> Result<(), ThreadlineError> {
        let mut by_owner: BTreeMap<Option<i64>, Vec<&PendingGroup>> = BTreeMap::new();
        for group in items {
            by_owner.entry(group.owner_id).or_default().push(group);
        }

        for (owner, batch) in &by_owner {
            self.embed_for_owner(*owner, batch).await?;
        }

        info!(groups = items.len(), owners = by_owner.len(), "batch embedded");
        Ok(())
    }
}
