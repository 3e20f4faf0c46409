// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database-backed job leases.
//!
//! One row per job name arbitrates which process may run that job. Leases
//! survive crashes as plain rows; a holder that died is recognized by age
//! and taken over once the lease passes `stale_secs`.

use parlor_core::ParlorError;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::database::Database;
use crate::models::JobLease;

/// Try to take the lease for `job_name`.
///
/// Succeeds when no lease exists, when the caller already holds it (the
/// timestamp is refreshed), or when the current lease is older than
/// `stale_secs`. Returns `false` when another live holder owns it.
pub async fn try_acquire(
    db: &Database,
    job_name: &str,
    holder_id: &str,
    stale_secs: u64,
) -> Result<bool, ParlorError> {
    let job_name = job_name.to_string();
    let holder_id = holder_id.to_string();
    let now_instant = parlor_core::time::now();
    let now = parlor_core::time::format(now_instant);
    let stale_cutoff = parlor_core::time::format(
        now_instant - chrono::Duration::seconds(stale_secs as i64),
    );
    db.connection()
        .call(move |conn| {
            // Take the write lock up front so two processes cannot both read
            // the same stale lease and both believe they won.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<(String, String)> = tx
                .query_row(
                    "SELECT holder_id, acquired_at FROM job_leases WHERE job_name = ?1",
                    params![job_name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let acquired = match existing {
                None => {
                    tx.execute(
                        "INSERT INTO job_leases (job_name, holder_id, acquired_at)
                         VALUES (?1, ?2, ?3)",
                        params![job_name, holder_id, now],
                    )?;
                    true
                }
                Some((current_holder, _)) if current_holder == holder_id => {
                    tx.execute(
                        "UPDATE job_leases SET acquired_at = ?1 WHERE job_name = ?2",
                        params![now, job_name],
                    )?;
                    true
                }
                Some((_, acquired_at)) if acquired_at <= stale_cutoff => {
                    tx.execute(
                        "UPDATE job_leases SET holder_id = ?1, acquired_at = ?2
                         WHERE job_name = ?3",
                        params![holder_id, now, job_name],
                    )?;
                    true
                }
                Some(_) => false,
            };

            tx.commit()?;
            Ok(acquired)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Release a lease. Only the holder may release; anything else is a no-op.
/// Returns `true` when a row was actually removed.
pub async fn release(db: &Database, job_name: &str, holder_id: &str) -> Result<bool, ParlorError> {
    let job_name = job_name.to_string();
    let holder_id = holder_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM job_leases WHERE job_name = ?1 AND holder_id = ?2",
                params![job_name, holder_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_lease(db: &Database, job_name: &str) -> Result<Option<JobLease>, ParlorError> {
    let job_name = job_name.to_string();
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    "SELECT job_name, holder_id, acquired_at FROM job_leases WHERE job_name = ?1",
                    params![job_name],
                    |row| {
                        Ok(JobLease {
                            job_name: row.get(0)?,
                            holder_id: row.get(1)?,
                            acquired_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
