// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pools of workers for one stage.

use threadline_core::{JobStore, Stage, ThreadlineError};
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};

use crate::worker::Worker;

/// Running workers of one stage.
pub struct WorkerPool {
    stage: Stage,
    tasks: JoinSet<Result<(), ThreadlineError>>,
}

impl WorkerPool {
    /// Spawn every worker, each inside its own `worker` span.
    pub fn spawn<S: JobStore>(stage: Stage, workers: Vec<Worker<S>>) -> Self {
        let mut tasks = JoinSet::new();
        for worker in workers {
            let span = info_span!("worker", worker.name = %worker.name(), %stage);
            tasks.spawn(async move { worker.run().await }.instrument(span));
        }
        info!(%stage, workers = tasks.len(), "worker pool started");
        Self { stage, tasks }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Wait for every worker. Returns the first worker error, after all
    /// workers have stopped.
    pub async fn join(mut self) -> Result<(), ThreadlineError> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(stage = %self.stage, error = %e, "worker exited with error");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!(stage = %self.stage, error = %e, "worker task panicked");
                    first_error.get_or_insert(ThreadlineError::Internal(format!(
                        "{} worker task failed: {e}",
                        self.stage
                    )));
                }
            }
        }
        info!(stage = %self.stage, "worker pool stopped");
        first_error.map_or(Ok(()), Err)
    }
}

/// Worker names as they appear in logs: `<stage>-<n>`, counted from 1.
pub fn worker_name(stage: Stage, index: usize) -> String {
    format!("{stage}-{}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_count_from_one() {
        assert_eq!(worker_name(Stage::Segmentation, 0), "segmentation-1");
        assert_eq!(worker_name(Stage::Embedding, 9), "embedding-10");
    }
}
