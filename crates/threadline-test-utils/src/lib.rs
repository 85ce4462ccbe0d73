// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Threadline integration tests.
//!
//! # Components
//!
//! - [`TestDb`] - migrated SQLite database in a temp directory, with seeding helpers
//! - [`MockProvider`] - scripted AI provider
//! - [`MemoryObjectStore`] - in-memory upload bucket

pub mod harness;
pub mod mock_object_store;
pub mod mock_provider;

pub use harness::TestDb;
pub use mock_object_store::MemoryObjectStore;
pub use mock_provider::MockProvider;
