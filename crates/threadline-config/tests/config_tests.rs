// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Threadline configuration system.

use std::io::Write;

use threadline_config::diagnostic::ConfigError;
use threadline_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use threadline_core::{AiSource, BatchFailurePolicy};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[logging]
level = "debug"

[storage]
database_path = "/tmp/threadline-test.db"
busy_timeout_ms = 250

[workers.upload]
worker_count = 1
batch_limit = 4
idle_sleep_secs = 2
run_forever = false

[workers.segmentation]
worker_count = 3
source = "mistral"
only_with_keys = true

[workers.embedding]
batch_limit = 25
failure_policy = "reset_to_pending"

[reaper]
interval_secs = 30
threshold_secs = 600

[retry]
max_attempts = 5
base_delay_ms = 3000
backoff_factor = 2.0
jitter = false

[providers]
segmentation_model = "gemini-2.0-flash"
embedding_model = "mistral-embed"

[providers.api_keys]
mistral = "mk"

[object_store]
root = "/srv/objects"
bucket = "exports"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.storage.busy_timeout_ms, 250);
    assert_eq!(config.workers.upload.batch_limit, 4);
    assert!(!config.workers.upload.run_forever);
    assert_eq!(config.workers.segmentation.worker_count, 3);
    assert_eq!(config.workers.segmentation.source, Some(AiSource::Mistral));
    assert!(config.workers.segmentation.only_with_keys);
    assert_eq!(config.workers.embedding.batch_limit, 25);
    assert_eq!(
        config.workers.embedding.failure_policy,
        BatchFailurePolicy::ResetToPending
    );
    assert_eq!(config.reaper.threshold_secs, 600);
    assert_eq!(config.retry.max_attempts, 5);
    assert!(!config.retry.jitter);
    assert_eq!(config.providers.api_keys.get(AiSource::Mistral), Some("mk"));
    assert_eq!(config.object_store.bucket, "exports");
}

#[test]
fn defaults_match_documented_values() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config.reaper.threshold_secs, 1800);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.segmentation.min_messages_per_day, 3);
    assert_eq!(
        config.workers.embedding.failure_policy,
        BatchFailurePolicy::MarkError
    );
    assert!(config.workers.upload.run_forever);
}

#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[reaper]
treshold_secs = 10
"#;

    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "treshold_secs");
            assert_eq!(suggestion.as_deref(), Some("threshold_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[workers.upload]
worker_count = "many"
"#;

    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn unknown_failure_policy_is_rejected() {
    let toml = r#"
[workers.embedding]
failure_policy = "ignore"
"#;
    assert!(load_and_validate_str(toml).is_err());
}

#[test]
fn validation_errors_surface_from_str_loader() {
    let toml = r#"
[workers.segmentation]
batch_limit = 0
only_with_keys = true
"#;

    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e, ConfigError::Validation { .. })));
}

#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            r#"
[workers.embedding]
batch_limit = 5
"#,
        )?;
        jail.set_env("THREADLINE_WORKERS_EMBEDDING_BATCH_LIMIT", "40");
        jail.set_env("THREADLINE_PROVIDERS_API_KEYS_GEMINI", "gk");
        jail.set_env("THREADLINE_REAPER_ENABLED", "false");

        let path = jail.directory().join("custom.toml");
        let config = load_and_validate_path(&path).expect("config should load");
        assert_eq!(config.workers.embedding.batch_limit, 40);
        assert_eq!(config.providers.api_keys.get(AiSource::Gemini), Some("gk"));
        assert!(!config.reaper.enabled);
        Ok(())
    });
}

#[test]
fn explicit_path_loads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[object_store]\nroot = \"/data/exports\"").unwrap();

    let config = load_and_validate_path(file.path()).unwrap();
    assert_eq!(config.object_store.root, "/data/exports");
}
