// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-item lifecycle: `pending -> processing -> {done, error}`.
//!
//! The store keeps status in a free-form metadata document. These types are
//! the typed view of it; translation to and from the document happens in the
//! storage adapter.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp layout written into metadata. Fixed width and UTC, so string
/// comparison in SQL orders the same way as time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// State of a single work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    /// No status recorded, or a value the queue does not recognise.
    Pending,
    Processing,
    Done,
    /// Failed attempt. Still eligible for the next claim.
    Error(String),
}

impl ItemState {
    pub const PROCESSING: &'static str = "processing";
    pub const DONE: &'static str = "done";
    pub const ERROR: &'static str = "error";

    /// Decode a raw status value. Anything other than processing, done or
    /// error reads as pending.
    pub fn from_parts(status: Option<&str>, error_message: Option<String>) -> Self {
        match status {
            Some(Self::PROCESSING) => Self::Processing,
            Some(Self::DONE) => Self::Done,
            Some(Self::ERROR) => Self::Error(error_message.unwrap_or_default()),
            _ => Self::Pending,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => Self::PROCESSING,
            Self::Done => Self::DONE,
            Self::Error(_) => Self::ERROR,
        }
    }
}

/// Instants recorded on each transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTimestamps {
    pub started_at: Option<DateTime<Utc>>,
    pub done_at: Option<DateTime<Utc>>,
    pub error_at: Option<DateTime<Utc>>,
}

/// Decoded status of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStatus {
    pub id: i64,
    pub state: ItemState,
    pub timestamps: StatusTimestamps,
}
