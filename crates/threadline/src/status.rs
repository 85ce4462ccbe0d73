// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `threadline status` command implementation.
//!
//! Reads per-state counts from the three queue tables.

use std::io::IsTerminal;

use serde::Serialize;
use threadline_config::ThreadlineConfig;
use threadline_core::ThreadlineError;
use threadline_storage::queries::status;
use threadline_storage::{Database, QueueTable, StateCounts};

use crate::open_database;

/// Counts for one stage, as printed by `--json`.
#[derive(Debug, Serialize)]
pub struct StageStatus {
    pub stage: String,
    pub pending: u64,
    pub processing: u64,
    pub done: u64,
    pub error: u64,
}

impl StageStatus {
    fn new(table: QueueTable, counts: StateCounts) -> Self {
        Self {
            stage: table.stage.to_string(),
            pending: counts.pending,
            processing: counts.processing,
            done: counts.done,
            error: counts.error,
        }
    }
}

pub async fn collect(db: &Database) -> Result<Vec<StageStatus>, ThreadlineError> {
    let mut stages = Vec::with_capacity(3);
    for table in [QueueTable::UPLOADS, QueueTable::CHATS, QueueTable::GROUPS] {
        let counts = status::count_states(db, table).await?;
        stages.push(StageStatus::new(table, counts));
    }
    Ok(stages)
}

/// Run the `threadline status` command.
///
/// `--json` prints the counts for scripting; `--plain`, or a non-TTY
/// stdout, disables colors.
pub async fn run_status(
    config: &ThreadlineConfig,
    json: bool,
    plain: bool,
) -> Result<(), ThreadlineError> {
    let db = open_database(config).await?;
    let stages = collect(&db).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&stages)
            .map_err(|e| ThreadlineError::Internal(format!("failed to render status: {e}")))?;
        println!("{rendered}");
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_table(&stages, use_color);
    }
    Ok(())
}

fn print_table(stages: &[StageStatus], use_color: bool) {
    println!();
    println!("  threadline status");
    println!("  {}", "-".repeat(58));
    println!(
        "    {:<14}{:>10}{:>12}{:>10}{:>10}",
        "stage", "pending", "processing", "done", "error"
    );
    for stage in stages {
        let error = if use_color && stage.error > 0 {
            use colored::Colorize;
            format!("{:>10}", stage.error).red().to_string()
        } else {
            format!("{:>10}", stage.error)
        };
        println!(
            "    {:<14}{:>10}{:>12}{:>10}{error}",
            stage.stage, stage.pending, stage.processing, stage.done
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_test_utils::TestDb;

    #[tokio::test]
    async fn counts_every_stage() {
        let test_db = TestDb::new().await.unwrap();
        let owner = test_db.user("ann").await.unwrap();
        let chats = test_db.chats(owner, 2).await.unwrap();
        test_db.groups(chats[0], &["travel"]).await.unwrap();
        status::mark_done(&test_db.db, QueueTable::CHATS, &chats[..1], chrono::Utc::now())
            .await
            .unwrap();

        let stages = collect(&test_db.db).await.unwrap();
        let names: Vec<&str> = stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(names, ["ingestion", "segmentation", "embedding"]);
        assert_eq!((stages[1].pending, stages[1].done), (1, 1));
        assert_eq!(stages[2].pending, 1);
    }

    #[test]
    fn status_serializes() {
        let stage = StageStatus {
            stage: "embedding".into(),
            pending: 4,
            processing: 1,
            done: 9,
            error: 0,
        };
        let json = serde_json::to_string(&stage).unwrap();
        assert!(json.contains("\"stage\":\"embedding\""));
        assert!(json.contains("\"done\":9"));
    }
}
