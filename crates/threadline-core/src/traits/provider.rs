// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for AI provider integrations.

use async_trait::async_trait;

use crate::error::ThreadlineError;
use crate::types::{
    AiSource, CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse,
};

/// One AI source behind a single capability surface.
///
/// Errors must be classified: 429 as [`ThreadlineError::RateLimited`],
/// exhausted quota as [`ThreadlineError::QuotaExhausted`], network and 5xx
/// failures as [`ThreadlineError::Transient`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn source(&self) -> AiSource;

    /// Replace the default API key used when a request carries none.
    fn set_auth(&mut self, api_key: String);

    async fn fetch_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ThreadlineError>;

    async fn fetch_embeddings(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ThreadlineError>;
}
