// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod object_store;
pub mod processor;
pub mod provider;
pub mod store;

pub use object_store::ObjectStore;
pub use processor::{BatchProcessor, ItemProcessor};
pub use provider::ProviderAdapter;
pub use store::{JobStore, WorkItem};
