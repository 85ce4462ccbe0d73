// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Threadline pipeline.
//!
//! WAL-mode SQLite with embedded migrations, accessed through
//! `tokio-rusqlite`. The three stage tables double as durable job queues:
//! [`queue`] exposes them through the `JobStore` trait, and
//! [`queries::status`] holds the claim protocol and status transitions they
//! share.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod queue;
pub mod table;

pub use database::{Database, DatabaseOptions};
pub use models::*;
pub use queries::chats::ChatFilter;
pub use queue::{ChatQueue, Chats, GroupQueue, Groups, SqliteQueue, UploadQueue, Uploads};
pub use table::QueueTable;
