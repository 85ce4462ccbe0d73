// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI provider adapters.
//!
//! Every supported source sits behind [`ProviderAdapter`]. The source is
//! resolved once from the model name when the adapter is built; callers never
//! branch on it afterwards.

pub mod gemini;
mod http;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use threadline_config::model::ProvidersConfig;
use threadline_core::{AiSource, ProviderAdapter, ThreadlineError};
use tracing::debug;

pub use gemini::GeminiClient;
pub use openai::OpenAiCompatibleClient;

/// Build the adapter serving `model`, with the configured fallback key and
/// any base URL override applied.
pub fn build_adapter(
    model: &str,
    config: &ProvidersConfig,
) -> Result<Arc<dyn ProviderAdapter>, ThreadlineError> {
    let source = config.source_for(model).ok_or_else(|| {
        ThreadlineError::Config(format!("cannot resolve an AI source for model `{model}`"))
    })?;
    let timeout = Duration::from_secs(config.timeout_secs);
    let api_key = config.api_keys.get(source).map(str::to_string);
    let override_url = config.base_urls.get(&source.to_string()).cloned();

    debug!(model, %source, "building provider adapter");

    let adapter: Arc<dyn ProviderAdapter> = match source {
        AiSource::Gemini => Arc::new(GeminiClient::new(override_url, api_key, timeout)?),
        AiSource::SelfHosted => {
            let endpoint = config.self_hosted_endpoints.get(model).ok_or_else(|| {
                ThreadlineError::Config(format!("no self-hosted endpoint for model `{model}`"))
            })?;
            Arc::new(OpenAiCompatibleClient::new(
                source,
                endpoint.clone(),
                api_key,
                timeout,
            )?)
        }
        AiSource::Mistral | AiSource::OpenAi | AiSource::Grok => {
            let base_url = match override_url {
                Some(url) => url,
                None => OpenAiCompatibleClient::default_base_url(source)
                    .unwrap_or_default()
                    .to_string(),
            };
            Arc::new(OpenAiCompatibleClient::new(
                source, base_url, api_key, timeout,
            )?)
        }
    };
    Ok(adapter)
}
