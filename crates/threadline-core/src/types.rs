// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared value types: pipeline stages, AI sources, provider requests.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One of the three pipeline phases, each with its own queue table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Uploaded export files waiting to be parsed into a chat.
    Ingestion,
    /// Chats waiting to be split into topic groups.
    Segmentation,
    /// Groups waiting for a vector embedding.
    Embedding,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Ingestion, Stage::Segmentation, Stage::Embedding];
}

/// AI provider family, resolved once from a model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AiSource {
    Mistral,
    Gemini,
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    Grok,
    SelfHosted,
}

impl AiSource {
    /// Resolve the hosted families from their model naming conventions.
    ///
    /// Self-hosted models have no naming convention; they are matched against
    /// configured endpoints before this is consulted.
    pub fn from_model(model: &str) -> Option<Self> {
        const MISTRAL: &[&str] = &[
            "mistral-", "open-mistral", "codestral", "ministral", "pixtral", "magistral",
        ];
        const OPENAI: &[&str] = &["gpt-", "chatgpt-", "o1", "o3", "o4", "text-embedding-"];

        let model = model.trim();
        if MISTRAL.iter().any(|p| model.starts_with(p)) {
            Some(Self::Mistral)
        } else if model.starts_with("gemini-") || model.starts_with("text-embedding-004") {
            Some(Self::Gemini)
        } else if OPENAI.iter().any(|p| model.starts_with(p)) {
            Some(Self::OpenAi)
        } else if model.starts_with("grok-") {
            Some(Self::Grok)
        } else {
            None
        }
    }
}

/// What a batch-mode worker does with its claimed items when the batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Record `error` with the failure message on every item.
    #[default]
    MarkError,
    /// Drop the status so every item is claimable again without an error trail.
    ResetToPending,
}

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A single-turn completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON-only reply when it supports it.
    pub json_response: bool,
    /// Per-user key; falls back to the adapter's configured key.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Embed every input string; one vector comes back per input, in order.
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub model: String,
    pub inputs: Vec<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub vectors: Vec<Vec<f32>>,
    pub usage: TokenUsage,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn resolves_sources_from_model_names() {
        assert_eq!(AiSource::from_model("mistral-small-latest"), Some(AiSource::Mistral));
        assert_eq!(AiSource::from_model("codestral-2501"), Some(AiSource::Mistral));
        assert_eq!(AiSource::from_model("gemini-2.0-flash"), Some(AiSource::Gemini));
        assert_eq!(AiSource::from_model("gpt-4o-mini"), Some(AiSource::OpenAi));
        assert_eq!(AiSource::from_model("grok-3-mini"), Some(AiSource::Grok));
        assert_eq!(AiSource::from_model("Qwen/Qwen3-8B"), None);
    }

    #[test]
    fn source_names_match_api_key_names() {
        assert_eq!(AiSource::OpenAi.to_string(), "openai");
        assert_eq!(AiSource::SelfHosted.to_string(), "self_hosted");
        assert_eq!(AiSource::from_str("openai").unwrap(), AiSource::OpenAi);
        assert_eq!(Stage::from_str("embedding").unwrap(), Stage::Embedding);
    }
}
