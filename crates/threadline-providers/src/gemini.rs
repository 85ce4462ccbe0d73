// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Gemini adapter (Generative Language API).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use threadline_core::{
    AiSource, CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse,
    ProviderAdapter, ThreadlineError, TokenUsage,
};
use tracing::debug;

use crate::http::{build_client, retry_after, send_error, status_error};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const RETRY_INFO_TYPE: &str = "type.googleapis.com/google.rpc.RetryInfo";
const QUOTA_FAILURE_TYPE: &str = "type.googleapis.com/google.rpc.QuotaFailure";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ThreadlineError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url
                .as_deref()
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        body: &B,
    ) -> Result<R, ThreadlineError> {
        let key = api_key
            .or(self.api_key.as_deref())
            .ok_or_else(|| ThreadlineError::Provider {
                message: "no API key configured for gemini".into(),
                source: None,
            })?;

        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await
            .map_err(send_error)?;
        let status = response.status();
        debug!(source = "gemini", %status, endpoint, "provider response received");

        if status.is_success() {
            let body = response.text().await.map_err(send_error)?;
            return serde_json::from_str(&body).map_err(|e| ThreadlineError::Provider {
                message: format!("failed to parse gemini response: {e}"),
                source: Some(Box::new(e)),
            });
        }

        let header_delay = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, header_delay, &body))
    }
}

/// Gemini reports rate limits in `google.rpc` error details: a `RetryInfo`
/// with the suggested delay and a `QuotaFailure` naming the violated quota.
/// A violated per-day quota will not recover by waiting a few seconds.
fn classify_failure(
    status: reqwest::StatusCode,
    header_delay: Option<Duration>,
    body: &str,
) -> ThreadlineError {
    if status != reqwest::StatusCode::TOO_MANY_REQUESTS {
        return status_error(status, body);
    }

    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return ThreadlineError::RateLimited {
            message: format!("API returned {status}"),
            retry_after: header_delay,
        };
    };
    let error = envelope.error;

    let mut retry_delay = None;
    let mut daily_quota = false;
    for detail in &error.details {
        match detail.get("@type").and_then(|t| t.as_str()) {
            Some(RETRY_INFO_TYPE) => {
                retry_delay = detail
                    .get("retryDelay")
                    .and_then(|d| d.as_str())
                    .and_then(parse_proto_duration);
            }
            Some(QUOTA_FAILURE_TYPE) => {
                daily_quota |= detail
                    .get("violations")
                    .and_then(|v| v.as_array())
                    .is_some_and(|violations| {
                        violations.iter().any(|v| {
                            v.get("quotaId")
                                .and_then(|id| id.as_str())
                                .is_some_and(|id| id.contains("PerDay"))
                        })
                    });
            }
            _ => {}
        }
    }

    let message = if error.message.is_empty() {
        format!("API returned {status}")
    } else {
        error.message
    };
    if daily_quota {
        ThreadlineError::QuotaExhausted { message }
    } else {
        ThreadlineError::RateLimited {
            message,
            retry_after: retry_delay.or(header_delay),
        }
    }
}

/// Parse a protobuf JSON duration such as `"7s"` or `"1.5s"`.
fn parse_proto_duration(value: &str) -> Option<Duration> {
    value
        .strip_suffix('s')?
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl ProviderAdapter for GeminiClient {
    fn source(&self) -> AiSource {
        AiSource::Gemini
    }

    fn set_auth(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    async fn fetch_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ThreadlineError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: request.system.as_deref().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                response_mime_type: request.json_response.then_some("application/json"),
            },
        };

        let endpoint = format!("models/{}:generateContent", request.model);
        let response: GenerateResponse = self
            .post(&endpoint, request.api_key.as_deref(), &body)
            .await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .ok_or_else(|| ThreadlineError::Provider {
                message: "gemini returned no candidates".into(),
                source: None,
            })?;

        let usage = response.usage_metadata;
        Ok(CompletionResponse {
            text,
            usage: TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            },
            model: response.model_version.unwrap_or(request.model),
        })
    }

    async fn fetch_embeddings(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ThreadlineError> {
        let qualified = format!("models/{}", request.model);
        let body = BatchEmbedRequest {
            requests: request
                .inputs
                .iter()
                .map(|input| EmbedContentRequest {
                    model: qualified.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part { text: input }],
                    },
                })
                .collect(),
        };

        let endpoint = format!("{qualified}:batchEmbedContents");
        let response: BatchEmbedResponse = self
            .post(&endpoint, request.api_key.as_deref(), &body)
            .await?;

        if response.embeddings.len() != request.inputs.len() {
            return Err(ThreadlineError::Provider {
                message: format!(
                    "gemini returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    request.inputs.len()
                ),
                source: None,
            });
        }

        // batchEmbedContents reports no token usage.
        Ok(EmbeddingResponse {
            vectors: response.embeddings.into_iter().map(|e| e.values).collect(),
            usage: TokenUsage::default(),
            model: request.model,
        })
    }
}
