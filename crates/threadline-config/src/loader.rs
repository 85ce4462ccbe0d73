// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/threadline/threadline.toml`,
//! `~/.config/threadline/threadline.toml`, `./threadline.toml`, then
//! `THREADLINE_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use tracing::debug;

use crate::model::ThreadlineConfig;

pub const SYSTEM_CONFIG_PATH: &str = "/etc/threadline/threadline.toml";
pub const LOCAL_CONFIG_PATH: &str = "threadline.toml";

/// Env var section prefixes and the config path each maps to. Longer prefixes
/// first so `workers_upload_*` never lands in a `workers` table.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("workers_upload_", "workers.upload."),
    ("workers_segmentation_", "workers.segmentation."),
    ("workers_embedding_", "workers.embedding."),
    ("providers_api_keys_", "providers.api_keys."),
    ("object_store_", "object_store."),
    ("segmentation_", "segmentation."),
    ("providers_", "providers."),
    ("logging_", "logging."),
    ("storage_", "storage."),
    ("reaper_", "reaper."),
    ("retry_", "retry."),
];

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("threadline/threadline.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<ThreadlineConfig, figment::Error> {
    debug!(
        system = SYSTEM_CONFIG_PATH,
        user = ?user_config_path(),
        local = LOCAL_CONFIG_PATH,
        "loading layered config"
    );
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults only.
pub fn load_config_from_str(toml_content: &str) -> Result<ThreadlineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ThreadlineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file, still honouring env overrides.
pub fn load_config_from_path(path: &Path) -> Result<ThreadlineConfig, figment::Error> {
    debug!(path = %path.display(), "loading config file");
    Figment::new()
        .merge(Serialized::defaults(ThreadlineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ThreadlineConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
///
/// `Env::split("_")` cannot be used because keys themselves contain
/// underscores: `WORKERS_EMBEDDING_FAILURE_POLICY` must become
/// `workers.embedding.failure_policy`.
pub fn map_env_key(key: &str) -> String {
    for (prefix, path) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{path}{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("THREADLINE_").map(|key| map_env_key(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_nested_sections() {
        assert_eq!(
            map_env_key("workers_segmentation_worker_count"),
            "workers.segmentation.worker_count"
        );
        assert_eq!(
            map_env_key("providers_api_keys_mistral"),
            "providers.api_keys.mistral"
        );
        assert_eq!(
            map_env_key("providers_embedding_model"),
            "providers.embedding_model"
        );
        assert_eq!(map_env_key("object_store_root"), "object_store.root");
        assert_eq!(map_env_key("reaper_threshold_secs"), "reaper.threshold_secs");
    }
}
