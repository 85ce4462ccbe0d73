// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter for the OpenAI-compatible API family: Mistral, OpenAI, Grok and
//! self-hosted inference servers.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use threadline_core::{
    AiSource, CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse,
    ProviderAdapter, ThreadlineError, TokenUsage,
};
use tracing::debug;

use crate::http::{build_client, retry_after, send_error, status_error};

pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROK_BASE_URL: &str = "https://api.x.ai/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<Usage> for TokenUsage {
    fn from(u: Usage) -> Self {
        TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    model: Option<String>,
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Client for any endpoint speaking the OpenAI chat-completions and
/// embeddings dialect.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    source: AiSource,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        source: AiSource,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ThreadlineError> {
        Ok(Self {
            client: build_client(timeout)?,
            source,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Default base URL of a hosted source. Self-hosted has none.
    pub fn default_base_url(source: AiSource) -> Option<&'static str> {
        match source {
            AiSource::Mistral => Some(MISTRAL_BASE_URL),
            AiSource::OpenAi => Some(OPENAI_BASE_URL),
            AiSource::Grok => Some(GROK_BASE_URL),
            AiSource::Gemini | AiSource::SelfHosted => None,
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        body: &B,
    ) -> Result<R, ThreadlineError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        match api_key.or(self.api_key.as_deref()) {
            Some(key) => request = request.bearer_auth(key),
            None if self.source != AiSource::SelfHosted => {
                return Err(ThreadlineError::Provider {
                    message: format!("no API key configured for {}", self.source),
                    source: None,
                });
            }
            None => {}
        }

        let response = request.send().await.map_err(send_error)?;
        let status = response.status();
        debug!(source = %self.source, %status, endpoint, "provider response received");

        if status.is_success() {
            let body = response.text().await.map_err(send_error)?;
            return serde_json::from_str(&body).map_err(|e| ThreadlineError::Provider {
                message: format!("failed to parse {} response: {e}", self.source),
                source: Some(Box::new(e)),
            });
        }

        let delay = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, delay, &body))
    }
}

/// 429 splits into quota exhaustion and plain rate limiting on the error code.
fn classify_failure(
    status: reqwest::StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ThreadlineError {
    if status != reqwest::StatusCode::TOO_MANY_REQUESTS {
        return status_error(status, body);
    }

    let error = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
    let quota = error.as_ref().is_some_and(|e| {
        let code = e.code.as_ref().and_then(|c| c.as_str());
        code == Some("insufficient_quota") || e.kind.as_deref() == Some("insufficient_quota")
    });
    let message = error
        .map(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("API returned {status}"));

    if quota {
        ThreadlineError::QuotaExhausted { message }
    } else {
        ThreadlineError::RateLimited {
            message,
            retry_after,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleClient {
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
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            response_format: request.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response: ChatResponse = self
            .post("chat/completions", request.api_key.as_deref(), &body)
            .await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ThreadlineError::Provider {
                message: format!("{} returned no completion choices", self.source),
                source: None,
            })?;

        Ok(CompletionResponse {
            text,
            usage: response.usage.into(),
            model: response.model.unwrap_or(request.model),
        })
    }

    async fn fetch_embeddings(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ThreadlineError> {
        let body = EmbeddingsRequest {
            model: &request.model,
            input: &request.inputs,
        };
        let mut response: EmbeddingsResponse = self
            .post("embeddings", request.api_key.as_deref(), &body)
            .await?;

        if response.data.len() != request.inputs.len() {
            return Err(ThreadlineError::Provider {
                message: format!(
                    "{} returned {} embeddings for {} inputs",
                    self.source,
                    response.data.len(),
                    request.inputs.len()
                ),
                source: None,
            });
        }
        response.data.sort_by_key(|d| d.index);

        Ok(EmbeddingResponse {
            vectors: response.data.into_iter().map(|d| d.embedding).collect(),
            usage: response.usage.into(),
            model: response.model.unwrap_or(request.model),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(
            AiSource::Mistral,
            server.uri(),
            Some("default-key".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn completion(prompt: &str, api_key: Option<&str>) -> CompletionRequest {
        CompletionRequest {
            model: "mistral-small-latest".into(),
            system: Some("be brief".into()),
            prompt: prompt.into(),
            temperature: Some(0.2),
            json_response: true,
            api_key: api_key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn completion_uses_per_request_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer user-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "mistral-small-2503",
                "choices": [{"message": {"role": "assistant", "content": "[]"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server)
            .fetch_completion(completion("hi", Some("user-key")))
            .await
            .unwrap();
        assert_eq!(response.text, "[]");
        assert_eq!(response.model, "mistral-small-2503");
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "5")
                    .set_body_json(serde_json::json!({
                        "error": {"message": "Requests rate limit exceeded", "code": "1300"}
                    })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_completion(completion("hi", None))
            .await
            .unwrap_err();
        match err {
            ThreadlineError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(5)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn insufficient_quota_is_not_a_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "message": "You exceeded your current quota",
                    "type": "insufficient_quota",
                    "code": "insufficient_quota"
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_embeddings(EmbeddingRequest {
                model: "text-embedding-3-small".into(),
                inputs: vec!["a".into()],
                api_key: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadlineError::QuotaExhausted { .. }));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_completion(completion("hi", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadlineError::Transient { .. }));
    }

    #[tokio::test]
    async fn embeddings_are_returned_in_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "mistral-embed",
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ],
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            })))
            .mount(&server)
            .await;

        let response = client(&server)
            .fetch_embeddings(EmbeddingRequest {
                model: "mistral-embed".into(),
                inputs: vec!["first".into(), "second".into()],
                api_key: None,
            })
            .await
            .unwrap();
        assert_eq!(response.vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(response.usage.input_tokens, 4);
    }

    #[tokio::test]
    async fn missing_key_fails_before_sending() {
        let server = MockServer::start().await;
        let mut client = OpenAiCompatibleClient::new(
            AiSource::OpenAi,
            server.uri(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client
            .fetch_completion(completion("hi", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadlineError::Provider { .. }));

        Mock::given(method("POST"))
            .and(header("authorization", "Bearer late-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;
        client.set_auth("late-key".into());
        let response = client.fetch_completion(completion("hi", None)).await.unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(response.model, "mistral-small-latest");
    }
}
