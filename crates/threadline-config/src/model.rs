// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is a
//! startup error rather than a silently ignored setting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use threadline_core::{AiSource, BatchFailurePolicy};

/// Top-level Threadline configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadlineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Worker pool settings, one table per stage.
    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub reaper: ReaperConfig,

    /// Backoff applied to every outbound AI call.
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    #[serde(default)]
    pub segmentation: SegmentationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("threadline/threadline.db").display().to_string())
        .unwrap_or_else(|| "threadline.db".to_string())
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkersConfig {
    #[serde(default)]
    pub upload: StageWorkerConfig,

    #[serde(default)]
    pub segmentation: SegmentationWorkerConfig,

    #[serde(default)]
    pub embedding: EmbeddingWorkerConfig,
}

/// Pool settings shared by every stage.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StageWorkerConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Seconds to sleep after a claim comes back empty.
    #[serde(default = "default_idle_sleep_secs")]
    pub idle_sleep_secs: u64,

    /// Keep polling on empty claims and survive loop-level errors.
    #[serde(default = "default_run_forever")]
    pub run_forever: bool,
}

impl Default for StageWorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            batch_limit: default_batch_limit(),
            idle_sleep_secs: default_idle_sleep_secs(),
            run_forever: default_run_forever(),
        }
    }
}

fn default_worker_count() -> usize {
    2
}

fn default_batch_limit() -> usize {
    1
}

fn default_idle_sleep_secs() -> u64 {
    5
}

fn default_run_forever() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentationWorkerConfig {
    #[serde(default = "default_segmentation_workers")]
    pub worker_count: usize,

    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    #[serde(default = "default_idle_sleep_secs")]
    pub idle_sleep_secs: u64,

    #[serde(default = "default_run_forever")]
    pub run_forever: bool,

    /// Only claim chats whose creator has a key for this source.
    #[serde(default)]
    pub source: Option<AiSource>,

    #[serde(default)]
    pub only_with_keys: bool,
}

impl Default for SegmentationWorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_segmentation_workers(),
            batch_limit: default_batch_limit(),
            idle_sleep_secs: default_idle_sleep_secs(),
            run_forever: default_run_forever(),
            source: None,
            only_with_keys: false,
        }
    }
}

impl SegmentationWorkerConfig {
    pub fn pool(&self) -> StageWorkerConfig {
        StageWorkerConfig {
            worker_count: self.worker_count,
            batch_limit: self.batch_limit,
            idle_sleep_secs: self.idle_sleep_secs,
            run_forever: self.run_forever,
        }
    }
}

fn default_segmentation_workers() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingWorkerConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_embedding_batch_limit")]
    pub batch_limit: usize,

    #[serde(default = "default_idle_sleep_secs")]
    pub idle_sleep_secs: u64,

    #[serde(default = "default_run_forever")]
    pub run_forever: bool,

    /// Outcome for every claimed group when the batch call fails.
    #[serde(default)]
    pub failure_policy: BatchFailurePolicy,
}

impl Default for EmbeddingWorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            batch_limit: default_embedding_batch_limit(),
            idle_sleep_secs: default_idle_sleep_secs(),
            run_forever: default_run_forever(),
            failure_policy: BatchFailurePolicy::default(),
        }
    }
}

impl EmbeddingWorkerConfig {
    pub fn pool(&self) -> StageWorkerConfig {
        StageWorkerConfig {
            worker_count: self.worker_count,
            batch_limit: self.batch_limit,
            idle_sleep_secs: self.idle_sleep_secs,
            run_forever: self.run_forever,
        }
    }
}

fn default_embedding_batch_limit() -> usize {
    10
}

/// Stuck-item reaper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReaperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,

    /// Items in `processing` for longer than this are reset.
    #[serde(default = "default_reaper_threshold_secs")]
    pub threshold_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reaper_interval_secs(),
            threshold_secs: default_reaper_threshold_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_reaper_threshold_secs() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            jitter: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

/// AI provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default = "default_segmentation_model")]
    pub segmentation_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fallback keys used when a user has none of their own.
    #[serde(default)]
    pub api_keys: ApiKeysConfig,

    /// Base URL overrides keyed by source name (`mistral`, `openai`, ...).
    #[serde(default)]
    pub base_urls: BTreeMap<String, String>,

    /// OpenAI-compatible endpoints for self-hosted models, keyed by model name.
    #[serde(default)]
    pub self_hosted_endpoints: BTreeMap<String, String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            segmentation_model: default_segmentation_model(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_timeout_secs(),
            api_keys: ApiKeysConfig::default(),
            base_urls: BTreeMap::new(),
            self_hosted_endpoints: BTreeMap::new(),
        }
    }
}

impl ProvidersConfig {
    /// Resolve a model to its source. Self-hosted endpoints take precedence.
    pub fn source_for(&self, model: &str) -> Option<AiSource> {
        if self.self_hosted_endpoints.contains_key(model) {
            return Some(AiSource::SelfHosted);
        }
        AiSource::from_model(model)
    }
}

fn default_segmentation_model() -> String {
    "mistral-small-latest".to_string()
}

fn default_embedding_model() -> String {
    "mistral-embed".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeysConfig {
    #[serde(default)]
    pub mistral: Option<String>,
    #[serde(default)]
    pub gemini: Option<String>,
    #[serde(default)]
    pub openai: Option<String>,
    #[serde(default)]
    pub grok: Option<String>,
    #[serde(default)]
    pub self_hosted: Option<String>,
}

impl ApiKeysConfig {
    pub fn get(&self, source: AiSource) -> Option<&str> {
        match source {
            AiSource::Mistral => self.mistral.as_deref(),
            AiSource::Gemini => self.gemini.as_deref(),
            AiSource::OpenAi => self.openai.as_deref(),
            AiSource::Grok => self.grok.as_deref(),
            AiSource::SelfHosted => self.self_hosted.as_deref(),
        }
    }
}

/// Local directory standing in for the upload bucket.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreConfig {
    #[serde(default = "default_object_root")]
    pub root: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root: default_object_root(),
            bucket: default_bucket(),
        }
    }
}

fn default_object_root() -> String {
    "objects".to_string()
}

fn default_bucket() -> String {
    "uploads".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentationConfig {
    /// Days with fewer messages than this are not segmented.
    #[serde(default = "default_min_messages_per_day")]
    pub min_messages_per_day: usize,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Language the group titles and summaries are written in.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_messages_per_day: default_min_messages_per_day(),
            temperature: None,
            language: default_language(),
        }
    }
}

fn default_language() -> String {
    "english".to_string()
}

fn default_min_messages_per_day() -> usize {
    3
}
