// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker loop: claim, process, record, repeat.
//!
//! Every claimed id is tracked until its outcome is written. If anything
//! escapes the per-item handling (a store failure while recording, or a
//! panic inside a processor) the ids still unresolved are reset to pending
//! before the error is reported, so nothing stays in `processing` because
//! of this worker.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use threadline_config::model::StageWorkerConfig;
use threadline_core::{
    BatchFailurePolicy, BatchProcessor, ItemProcessor, JobStore, ThreadlineError, WorkItem,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How a stage consumes its claimed batch.
pub enum Processing<I> {
    /// Each item is processed and recorded on its own.
    PerItem(Arc<dyn ItemProcessor<I>>),
    /// The batch goes to one call; its outcome applies to every item.
    Batch {
        processor: Arc<dyn BatchProcessor<I>>,
        on_failure: BatchFailurePolicy,
    },
}

impl<I> Clone for Processing<I> {
    fn clone(&self) -> Self {
        match self {
            Processing::PerItem(p) => Processing::PerItem(Arc::clone(p)),
            Processing::Batch {
                processor,
                on_failure,
            } => Processing::Batch {
                processor: Arc::clone(processor),
                on_failure: *on_failure,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub batch_limit: usize,
    pub idle_sleep: Duration,
    /// Keep polling after an empty claim and after loop-level errors.
    pub run_forever: bool,
}

impl From<&StageWorkerConfig> for WorkerOptions {
    fn from(config: &StageWorkerConfig) -> Self {
        Self {
            batch_limit: config.batch_limit.max(1),
            idle_sleep: Duration::from_secs(config.idle_sleep_secs),
            run_forever: config.run_forever,
        }
    }
}

/// Ids claimed in the current attempt whose outcome is not yet recorded.
#[derive(Debug, Default)]
struct InFlight {
    ids: BTreeSet<i64>,
}

impl InFlight {
    fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    fn resolve(&mut self, id: i64) {
        self.ids.remove(&id);
    }

    fn resolve_all(&mut self) {
        self.ids.clear();
    }

    fn unresolved(&self) -> Vec<i64> {
        self.ids.iter().copied().collect()
    }
}

pub struct Worker<S: JobStore> {
    name: String,
    store: S,
    processing: Processing<S::Item>,
    options: WorkerOptions,
    cancel: CancellationToken,
}

impl<S: JobStore> Worker<S> {
    pub fn new(
        name: impl Into<String>,
        store: S,
        processing: Processing<S::Item>,
        options: WorkerOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            processing,
            options,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Poll until cancelled, or until the queue is empty when not running
    /// forever. Loop-level errors end the loop only when not running forever.
    pub async fn run(&self) -> Result<(), ThreadlineError> {
        info!("worker started");
        loop {
            if self.cancel.is_cancelled() {
                info!("worker stopping on shutdown");
                return Ok(());
            }

            match self.run_once().await {
                Ok(0) if !self.options.run_forever => {
                    debug!("queue empty, worker stopping");
                    return Ok(());
                }
                Ok(0) => {
                    trace!(sleep = ?self.options.idle_sleep, "queue empty");
                    self.idle().await;
                }
                Ok(_) => {}
                Err(e) if self.options.run_forever => {
                    error!(error = %e, "worker iteration failed");
                    self.idle().await;
                }
                Err(e) => {
                    error!(error = %e, "worker iteration failed, stopping");
                    return Err(e);
                }
            }
        }
    }

    async fn idle(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.options.idle_sleep) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    /// One claim and the processing of everything claimed. Returns the
    /// number of items claimed.
    pub async fn run_once(&self) -> Result<usize, ThreadlineError> {
        let batch = self.store.claim_batch(self.options.batch_limit).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = batch.iter().map(WorkItem::id).collect();
        debug!(?ids, "claimed batch");
        let mut in_flight = InFlight::new(ids.iter().copied());

        let outcome = AssertUnwindSafe(self.process(&batch, &mut in_flight))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ThreadlineError::Internal(format!(
                    "processor panicked: {}",
                    panic_message(&*panic)
                )))
            });

        if let Err(e) = &outcome {
            self.recover(&in_flight, e).await;
        }
        outcome.map(|()| batch.len())
    }

    async fn process(
        &self,
        batch: &[S::Item],
        in_flight: &mut InFlight,
    ) -> Result<(), ThreadlineError> {
        match &self.processing {
            Processing::PerItem(processor) => {
                for item in batch {
                    let id = item.id();
                    match processor.process(item).await {
                        Ok(()) => {
                            self.store.mark_done(&[id]).await?;
                            debug!(item.id = id, "item done");
                        }
                        Err(e) => {
                            warn!(item.id = id, error = %e, "item failed");
                            self.store.mark_error(&[id], &e.to_string()).await?;
                        }
                    }
                    in_flight.resolve(id);
                }
            }
            Processing::Batch {
                processor,
                on_failure,
            } => {
                let ids = in_flight.unresolved();
                match processor.process_batch(batch).await {
                    Ok(()) => {
                        self.store.mark_done(&ids).await?;
                        debug!(?ids, "batch done");
                    }
                    Err(e) => {
                        warn!(?ids, error = %e, policy = %on_failure, "batch failed");
                        match on_failure {
                            BatchFailurePolicy::MarkError => {
                                self.store.mark_error(&ids, &e.to_string()).await?;
                            }
                            BatchFailurePolicy::ResetToPending => {
                                self.store.reset(&ids).await?;
                            }
                        }
                    }
                }
                in_flight.resolve_all();
            }
        }
        Ok(())
    }

    async fn recover(&self, in_flight: &InFlight, cause: &ThreadlineError) {
        let ids = in_flight.unresolved();
        if ids.is_empty() {
            return;
        }
        match self.store.reset(&ids).await {
            Ok(_) => warn!(?ids, error = %cause, "reset unresolved items after failure"),
            Err(e) => error!(
                ?ids,
                error = %e,
                cause = %cause,
                "could not reset unresolved items, leaving them to the reaper"
            ),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_tracks_unresolved_ids() {
        let mut in_flight = InFlight::new([3, 1, 2]);
        in_flight.resolve(1);
        assert_eq!(in_flight.unresolved(), vec![2, 3]);
        in_flight.resolve(1);
        in_flight.resolve_all();
        assert!(in_flight.unresolved().is_empty());
    }

    #[test]
    fn options_from_config() {
        let config = StageWorkerConfig {
            worker_count: 4,
            batch_limit: 0,
            idle_sleep_secs: 7,
            run_forever: false,
        };
        let options = WorkerOptions::from(&config);
        assert_eq!(options.batch_limit, 1);
        assert_eq!(options.idle_sleep, Duration::from_secs(7));
        assert!(!options.run_forever);
    }

    #[test]
    fn panic_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42_u8), "unknown panic payload");
    }
}
