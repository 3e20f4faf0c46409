// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery for Parlor.
//!
//! [`HttpCrmClient`] speaks the partner CRM's REST API; [`SyncWorker`]
//! drains the durable outbox into it. The worker delivers enqueue-time
//! snapshots verbatim and records every outcome back on the job row, so
//! reconciliation state and delivery state never disagree silently.

pub mod client;
pub mod directory;
pub mod worker;

pub use client::HttpCrmClient;
pub use directory::HttpAliasResolver;
pub use worker::{SyncWorker, WorkerSettings};
