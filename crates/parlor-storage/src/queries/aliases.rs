// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending pseudo-identifier resolutions.
//!
//! Channels that hide real phone numbers behind opaque aliases get a row
//! here; a background pass retries resolution until the real number shows
//! up or the attempt budget runs out.

use parlor_core::ParlorError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::models::AliasResolution;

const RESOLUTION_COLUMNS: &str =
    "id, tenant_id, channel, alias, contact_id, status, attempts, next_attempt_at, \
     created_at, updated_at";

fn resolution_from_row(row: &rusqlite::Row<'_>) -> Result<AliasResolution, rusqlite::Error> {
    Ok(AliasResolution {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        channel: row.get(2)?,
        alias: row.get(3)?,
        contact_id: row.get(4)?,
        status: row.get(5)?,
        attempts: row.get(6)?,
        next_attempt_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Record an alias that needs resolving. Re-observing a known alias is a
/// no-op; the existing row keeps its attempt history.
///
/// Returns `true` when a new row was created.
pub async fn upsert_pending(
    db: &Database,
    tenant_id: &str,
    channel: &str,
    alias: &str,
    contact_id: &str,
) -> Result<bool, ParlorError> {
    let tenant_id = tenant_id.to_string();
    let channel = channel.to_string();
    let alias = alias.to_string();
    let contact_id = contact_id.to_string();
    let now = parlor_core::time::format(parlor_core::time::now());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO alias_resolutions
                 (tenant_id, channel, alias, contact_id, next_attempt_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![tenant_id, channel, alias, contact_id, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Pending resolutions whose retry time has arrived, oldest first.
pub async fn due_pending(db: &Database, limit: i64) -> Result<Vec<AliasResolution>, ParlorError> {
    let now = parlor_core::time::format(parlor_core::time::now());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RESOLUTION_COLUMNS} FROM alias_resolutions
                 WHERE status = 'pending' AND next_attempt_at <= ?1
                 ORDER BY next_attempt_at ASC, id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![now, limit], resolution_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn mark_resolved(db: &Database, id: i64) -> Result<(), ParlorError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE alias_resolutions SET status = 'resolved',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Schedule another attempt, or park the row as exhausted once the budget
/// is spent. Returns `true` when the row is still pending.
pub async fn defer_retry(
    db: &Database,
    id: i64,
    retry_delay_secs: u64,
    max_attempts: i64,
) -> Result<bool, ParlorError> {
    let next_attempt_at = parlor_core::time::format(
        parlor_core::time::now() + chrono::Duration::seconds(retry_delay_secs as i64),
    );
    db.connection()
        .call(move |conn| {
            let attempts: i64 = conn.query_row(
                "SELECT attempts FROM alias_resolutions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;

            let new_attempts = attempts + 1;
            if new_attempts >= max_attempts {
                conn.execute(
                    "UPDATE alias_resolutions SET status = 'exhausted', attempts = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![new_attempts, id],
                )?;
                Ok(false)
            } else {
                conn.execute(
                    "UPDATE alias_resolutions SET attempts = ?1, next_attempt_at = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_attempts, next_attempt_at, id],
                )?;
                Ok(true)
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_resolution(db: &Database, id: i64) -> Result<Option<AliasResolution>, ParlorError> {
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {RESOLUTION_COLUMNS} FROM alias_resolutions WHERE id = ?1"),
                    params![id],
                    resolution_from_row,
                )
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
