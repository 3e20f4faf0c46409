// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use parlor_core::ParlorError;
use tokio_rusqlite::Connection;
use tracing::debug;

/// Handle to the SQLite database.
///
/// Cloning is cheap; every clone talks to the same background thread, so all
/// writes stay serialized no matter how many tasks hold a handle.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
    path: String,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply PRAGMAs, and
    /// run any pending migrations.
    pub async fn open(path: &str) -> Result<Database, ParlorError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| map_tr_err(e.into()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        // Migrations run in their own call so refinery failures surface as-is.
        conn.call(|conn| Ok(crate::migrations::run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;

        debug!(path, "database opened");
        Ok(Database {
            conn,
            path: path.to_string(),
        })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Filesystem path this database was opened at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Flush the WAL into the main database file.
    ///
    /// Called on shutdown; the connection itself closes when the last handle
    /// drops.
    pub async fn close(&self) -> Result<(), ParlorError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.path, "WAL checkpoint complete");
        Ok(())
    }
}

/// Map a tokio-rusqlite error into the workspace error type.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> ParlorError {
    ParlorError::Storage { source: Box::new(e) }
}
