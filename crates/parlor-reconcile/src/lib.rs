// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation passes for the Parlor service.
//!
//! The online half ([`ingest`], [`resolver`]) attaches channel events to
//! canonical contacts and conversations without locks. The batch half
//! ([`merge`], [`repair`], [`purge`], [`alias`]) runs periodically and
//! restores every invariant the online path can only keep best-effort
//! under races.

pub mod alias;
pub mod ingest;
pub mod merge;
pub mod purge;
pub mod repair;
pub mod resolver;

pub use alias::{resolve_pending, AliasReport};
pub use ingest::{author_message, ingest_message, AuthoredMessage, IngestOutcome};
pub use merge::{merge_all, merge_contact, MergeReport};
pub use purge::{purge_trash, PurgeReport};
pub use repair::{repair_summaries, RepairReport};
