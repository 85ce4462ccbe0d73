// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker runtime for the Threadline pipeline.
//!
//! A [`Worker`] polls one [`JobStore`](threadline_core::JobStore), hands
//! claimed items to its stage processor and records every outcome. The
//! [`Reaper`] resets rows left in `processing` by workers that died without
//! recovering. [`WorkerPool`] runs many workers of one stage and waits for
//! them on shutdown.

pub mod pool;
pub mod reaper;
pub mod shutdown;
pub mod worker;

pub use pool::{WorkerPool, worker_name};
pub use reaper::{Reapable, Reaper};
pub use shutdown::install_signal_handler;
pub use worker::{Processing, Worker, WorkerOptions};
