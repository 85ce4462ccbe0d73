// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions, one module per table family.

pub mod chats;
pub mod groups;
pub mod requests;
pub mod status;
pub mod uploads;
pub mod users;
