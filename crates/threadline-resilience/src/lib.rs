// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for outbound AI calls.

pub mod retry;

pub use retry::{RetryPolicy, Retryable, retry, retry_with};
