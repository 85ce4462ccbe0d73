// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stuck-item reaper.
//!
//! A worker killed mid-batch never runs its recovery, so its rows stay in
//! `processing`. The reaper resets rows whose `started_at` is older than the
//! threshold, on its own timer and independent of any worker. A worker still
//! alive past the threshold loses its claim; its later status write simply
//! wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use threadline_config::model::ReaperConfig;
use threadline_core::{JobStore, Stage, ThreadlineError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The part of a queue the reaper needs, independent of its item type.
#[async_trait]
pub trait Reapable: Send + Sync {
    fn queue_stage(&self) -> Stage;

    async fn reap(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, ThreadlineError>;
}

#[async_trait]
impl<S: JobStore> Reapable for S {
    fn queue_stage(&self) -> Stage {
        JobStore::stage(self)
    }

    async fn reap(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, ThreadlineError> {
        self.reap_stuck(cutoff).await
    }
}

pub struct Reaper {
    queues: Vec<Arc<dyn Reapable>>,
    threshold: Duration,
    interval: Duration,
}

impl Reaper {
    pub fn new(queues: Vec<Arc<dyn Reapable>>, threshold: Duration, interval: Duration) -> Self {
        Self {
            queues,
            threshold,
            interval,
        }
    }

    pub fn from_config(queues: Vec<Arc<dyn Reapable>>, config: &ReaperConfig) -> Self {
        Self::new(
            queues,
            Duration::from_secs(config.threshold_secs),
            Duration::from_secs(config.interval_secs),
        )
    }

    /// One pass over every queue. A failing queue is logged and skipped.
    /// Returns the reset ids per stage.
    pub async fn reap_once(&self, now: DateTime<Utc>) -> Vec<(Stage, Vec<i64>)> {
        let cutoff = match chrono::Duration::from_std(self.threshold) {
            Ok(threshold) => now - threshold,
            Err(_) => DateTime::<Utc>::MIN_UTC,
        };

        let mut reaped = Vec::with_capacity(self.queues.len());
        for queue in &self.queues {
            let stage = queue.queue_stage();
            match queue.reap(cutoff).await {
                Ok(ids) if ids.is_empty() => {
                    debug!(%stage, "no stuck items");
                }
                Ok(ids) => {
                    for id in &ids {
                        info!(%stage, item.id = id, "reset stuck item");
                    }
                    reaped.push((stage, ids));
                }
                Err(e) => warn!(%stage, error = %e, "reaper pass failed"),
            }
        }
        reaped
    }

    /// Reap on every tick until cancelled. The first pass runs immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            threshold_secs = self.threshold.as_secs(),
            interval_secs = self.interval.as_secs(),
            "reaper started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reap_once(Utc::now()).await;
                }
                _ = cancel.cancelled() => {
                    info!("reaper shutting down");
                    break;
                }
            }
        }
    }
}
