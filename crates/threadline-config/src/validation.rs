// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use threadline_core::AiSource;

use crate::diagnostic::ConfigError;
use crate::model::{StageWorkerConfig, ThreadlineConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration. Collects every failure instead of
/// stopping at the first.
pub fn validate_config(config: &ThreadlineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "logging.level `{}` must be one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    check_pool("workers.upload", &config.workers.upload, &mut errors);
    check_pool(
        "workers.segmentation",
        &config.workers.segmentation.pool(),
        &mut errors,
    );
    check_pool(
        "workers.embedding",
        &config.workers.embedding.pool(),
        &mut errors,
    );

    if config.workers.segmentation.only_with_keys && config.workers.segmentation.source.is_none()
    {
        errors.push(ConfigError::validation(
            "workers.segmentation.only_with_keys requires workers.segmentation.source",
        ));
    }

    if config.reaper.enabled {
        if config.reaper.interval_secs == 0 {
            errors.push(ConfigError::validation(
                "reaper.interval_secs must be at least 1",
            ));
        }
        if config.reaper.threshold_secs == 0 {
            errors.push(ConfigError::validation(
                "reaper.threshold_secs must be at least 1",
            ));
        }
    }

    if config.retry.max_attempts < 1 {
        errors.push(ConfigError::validation("retry.max_attempts must be at least 1"));
    }
    if config.retry.backoff_factor.is_nan() || config.retry.backoff_factor < 1.0 {
        errors.push(ConfigError::validation(format!(
            "retry.backoff_factor must be >= 1.0, got {}",
            config.retry.backoff_factor
        )));
    }

    for (field, model) in [
        ("providers.segmentation_model", &config.providers.segmentation_model),
        ("providers.embedding_model", &config.providers.embedding_model),
    ] {
        if config.providers.source_for(model).is_none() {
            errors.push(ConfigError::validation(format!(
                "{field} `{model}` does not belong to a known source; \
                 add it to providers.self_hosted_endpoints if it is self-hosted"
            )));
        }
    }

    for name in config.providers.base_urls.keys() {
        if name.parse::<AiSource>().is_err() {
            errors.push(ConfigError::validation(format!(
                "providers.base_urls key `{name}` is not a known source"
            )));
        }
    }

    if config.object_store.bucket.contains(['/', '\\']) || config.object_store.bucket.is_empty() {
        errors.push(ConfigError::validation(format!(
            "object_store.bucket `{}` must be a single path segment",
            config.object_store.bucket
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_pool(section: &str, pool: &StageWorkerConfig, errors: &mut Vec<ConfigError>) {
    if pool.worker_count == 0 {
        errors.push(ConfigError::validation(format!(
            "{section}.worker_count must be at least 1"
        )));
    }
    if pool.batch_limit == 0 {
        errors.push(ConfigError::validation(format!(
            "{section}.batch_limit must be at least 1"
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ThreadlineConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_pool_error() {
        let mut config = ThreadlineConfig::default();
        config.workers.upload.worker_count = 0;
        config.workers.embedding.batch_limit = 0;
        config.retry.backoff_factor = 0.5;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        let text: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert!(text.iter().any(|t| t.contains("workers.upload.worker_count")));
        assert!(text.iter().any(|t| t.contains("workers.embedding.batch_limit")));
        assert!(text.iter().any(|t| t.contains("retry.backoff_factor")));
    }

    #[test]
    fn unknown_model_is_rejected_unless_self_hosted() {
        let mut config = ThreadlineConfig::default();
        config.providers.segmentation_model = "Qwen/Qwen3-8B".into();
        assert!(validate_config(&config).is_err());

        config.providers.self_hosted_endpoints.insert(
            "Qwen/Qwen3-8B".into(),
            "http://localhost:8000/v1".into(),
        );
        assert!(validate_config(&config).is_ok());
    }
}
