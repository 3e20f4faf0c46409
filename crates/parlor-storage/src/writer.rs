// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-writer rules for this crate.
//!
//! One `Database` holds one `tokio_rusqlite::Connection`, and every query
//! module takes `&Database`. The connection runs all closures on a single
//! background thread, so writes from the sync worker, the scheduled jobs,
//! and the CLI one-shots never race each other inside this process.
//!
//! **Do NOT open additional Connection instances for writes.**
//!
//! Multi-step invariants live in explicit transactions inside one `call`
//! closure: the per-contact conversation merge and the outbox claim each
//! commit or roll back as a unit. Ingestion adapters running as separate
//! processes are coordinated only by the schema's uniqueness constraints,
//! WAL mode, and `busy_timeout`; nothing in this crate locks across
//! processes.
