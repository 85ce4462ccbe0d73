// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock AI provider for deterministic testing.
//!
//! Completions are popped from a FIFO queue of scripted outcomes. Embeddings
//! return a fixed-dimension vector per input unless an error is queued for
//! them. Every request is recorded for later assertions.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use threadline_core::{
    AiSource, CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse,
    ProviderAdapter, ThreadlineError, TokenUsage,
};

/// Dimension of the vectors returned by default.
pub const MOCK_DIMENSIONS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedRequest {
    Completion {
        model: String,
        prompt: String,
        api_key: Option<String>,
    },
    Embeddings {
        model: String,
        inputs: Vec<String>,
        api_key: Option<String>,
    },
}

pub struct MockProvider {
    source: AiSource,
    completions: Arc<Mutex<VecDeque<Result<String, ThreadlineError>>>>,
    embedding_errors: Arc<Mutex<VecDeque<ThreadlineError>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    api_key: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            source: AiSource::Mistral,
            completions: Arc::new(Mutex::new(VecDeque::new())),
            embedding_errors: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            api_key: None,
        }
    }

    /// Pre-load successful completion texts.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            completions: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            ..Self::new()
        }
    }

    pub async fn push_completion(&self, outcome: Result<String, ThreadlineError>) {
        self.completions.lock().await.push_back(outcome);
    }

    /// Fail the next embeddings call with `error`.
    pub async fn push_embedding_error(&self, error: ThreadlineError) {
        self.embedding_errors.lock().await.push_back(error);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub fn default_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn usage(input: usize) -> TokenUsage {
    let input_tokens = input as u32;
    TokenUsage {
        input_tokens,
        output_tokens: 5,
        total_tokens: input_tokens + 5,
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn source(&self) -> AiSource {
        self.source
    }

    fn set_auth(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    async fn fetch_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ThreadlineError> {
        self.requests.lock().await.push(RecordedRequest::Completion {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            api_key: request.api_key.clone(),
        });
        let text = self
            .completions
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()))?;
        Ok(CompletionResponse {
            text,
            usage: usage(request.prompt.split_whitespace().count()),
            model: request.model,
        })
    }

    async fn fetch_embeddings(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ThreadlineError> {
        self.requests.lock().await.push(RecordedRequest::Embeddings {
            model: request.model.clone(),
            inputs: request.inputs.clone(),
            api_key: request.api_key.clone(),
        });
        if let Some(error) = self.embedding_errors.lock().await.pop_front() {
            return Err(error);
        }
        let vectors = request
            .inputs
            .iter()
            .map(|input| {
                let mut vector = vec![0.0; MOCK_DIMENSIONS];
                vector[0] = input.len() as f32;
                vector
            })
            .collect();
        Ok(EmbeddingResponse {
            vectors,
            usage: usage(request.inputs.len()),
            model: request.model,
        })
    }
}
