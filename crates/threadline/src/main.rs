// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threadline - chat ingestion, topic segmentation and embedding workers.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod enqueue;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use threadline_config::ThreadlineConfig;
use threadline_core::{Stage, ThreadlineError};

/// Threadline - chat ingestion, topic segmentation and embedding workers.
#[derive(Parser, Debug)]
#[command(name = "threadline", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the standard search path.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every stage pool and the reaper until interrupted.
    Serve,
    /// Run the worker pool of a single stage.
    Work {
        /// ingestion, segmentation or embedding.
        stage: Stage,
    },
    /// Reset stuck items once and exit.
    Reap,
    /// Register an export already present in the object store.
    EnqueueUpload {
        /// Username of the uploader. Created when unknown.
        #[arg(long)]
        user: String,
        /// Object key inside the upload bucket.
        #[arg(long)]
        key: String,
        /// Export format of the file.
        #[arg(long, default_value = "telegram")]
        source_kind: String,
    },
    /// Show per-stage item counts.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Manage Threadline configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration, then exit.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            threadline_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    if let Commands::Config {
        action: ConfigCommand::Check,
    } = cli.command
    {
        println!(
            "threadline: config ok (database={}, segmentation_model={}, embedding_model={})",
            config.storage.database_path,
            config.providers.segmentation_model,
            config.providers.embedding_model
        );
        return;
    }

    init_tracing(&config.logging.level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Work { stage } => serve::run_stage(config, stage).await,
        Commands::Reap => serve::run_reap(&config).await,
        Commands::EnqueueUpload {
            user,
            key,
            source_kind,
        } => enqueue::run_enqueue(&config, &user, &key, &source_kind).await,
        Commands::Status { json, plain } => status::run_status(&config, json, plain).await,
        Commands::Config { .. } => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<ThreadlineConfig, Vec<threadline_config::ConfigError>> {
    match path {
        Some(path) => threadline_config::load_and_validate_path(path),
        None => threadline_config::load_and_validate(),
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("threadline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

/// Storage options from `[storage]`.
pub(crate) fn database_options(config: &ThreadlineConfig) -> threadline_storage::DatabaseOptions {
    threadline_storage::DatabaseOptions {
        busy_timeout: std::time::Duration::from_millis(config.storage.busy_timeout_ms),
    }
}

pub(crate) async fn open_database(
    config: &ThreadlineConfig,
) -> Result<threadline_storage::Database, ThreadlineError> {
    threadline_storage::Database::open_with(&config.storage.database_path, database_options(config))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc can advance the epoch; the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn parses_work_stage() {
        let cli = Cli::try_parse_from(["threadline", "work", "embedding"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Work {
                stage: Stage::Embedding
            }
        ));
        assert!(Cli::try_parse_from(["threadline", "work", "translation"]).is_err());
    }

    #[test]
    fn parses_enqueue_upload_with_default_kind() {
        let cli = Cli::try_parse_from([
            "threadline",
            "--config",
            "/tmp/threadline.toml",
            "enqueue-upload",
            "--user",
            "ann",
            "--key",
            "exports/result.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/threadline.toml")));
        match cli.command {
            Commands::EnqueueUpload {
                user,
                key,
                source_kind,
            } => {
                assert_eq!(user, "ann");
                assert_eq!(key, "exports/result.json");
                assert_eq!(source_kind, "telegram");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_config_check() {
        let cli = Cli::try_parse_from(["threadline", "config", "check"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigCommand::Check
            }
        ));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = threadline_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.providers.segmentation_model, "mistral-small-latest");
    }
}
