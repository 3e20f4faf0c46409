// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Parlor reconciliation service.
//!
//! One WAL-mode database holds contacts, conversations, messages, the
//! delivery outbox, job leases, and pending alias resolutions. Schema comes
//! from embedded migrations; access goes through typed query modules over a
//! single `tokio-rusqlite` connection (see [`writer`]).

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod writer;

pub use database::Database;
pub use models::*;
