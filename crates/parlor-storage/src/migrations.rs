// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations.
//!
//! The SQL under `migrations/` is compiled in through refinery's
//! `embed_migrations!` and replayed on every database open, so a fresh file
//! and a long-lived one converge on the same schema.

use parlor_core::ParlorError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Apply any migrations this database has not seen yet.
///
/// Refinery records applied versions in `refinery_schema_history`.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), ParlorError> {
    embedded::migrations::runner()
        .run(conn)
        .map(|_report| ())
        .map_err(|e| ParlorError::Storage {
            source: Box::new(e),
        })
}
