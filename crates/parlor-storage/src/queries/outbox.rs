// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbox operations for crash-safe outbound delivery.

use parlor_core::types::DeliveryPayload;
use parlor_core::ParlorError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::models::OutboxJob;

const JOB_COLUMNS: &str = "id, tenant_id, payload, status, attempts, max_attempts, \
     next_attempt_at, locked_until, last_error, created_at, updated_at";

fn job_from_row(row: &rusqlite::Row<'_>) -> Result<OutboxJob, rusqlite::Error> {
    Ok(OutboxJob {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        next_attempt_at: row.get(6)?,
        locked_until: row.get(7)?,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Counters for the `queue status` report.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
}

/// Enqueue a delivery job. The payload snapshot is frozen here; later edits
/// to the contact or message do not change what gets sent.
///
/// Returns the auto-generated job ID.
pub async fn enqueue(
    db: &Database,
    payload: &DeliveryPayload,
    max_attempts: i64,
) -> Result<i64, ParlorError> {
    let tenant_id = payload.tenant_id.clone();
    let snapshot = serde_json::to_string(payload)
        .map_err(|e| ParlorError::Serialization { source: Box::new(e) })?;
    let now = parlor_core::time::format(parlor_core::time::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO outbox_jobs (tenant_id, payload, max_attempts, next_attempt_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![tenant_id, snapshot, max_attempts, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim the next due job.
///
/// Atomically selects the oldest-due pending job, or a processing job whose
/// lock has expired (its worker died mid-send), and marks it processing with
/// a fresh lock. Returns `None` when nothing is due.
pub async fn dequeue(
    db: &Database,
    lock_timeout_secs: u64,
) -> Result<Option<OutboxJob>, ParlorError> {
    let now_instant = parlor_core::time::now();
    let now = parlor_core::time::format(now_instant);
    let lock_expiry = parlor_core::time::format(
        now_instant + chrono::Duration::seconds(lock_timeout_secs as i64),
    );
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let claimed = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM outbox_jobs
                     WHERE (status = 'pending' AND next_attempt_at <= ?1)
                        OR (status = 'processing' AND locked_until IS NOT NULL
                            AND locked_until <= ?1)
                     ORDER BY next_attempt_at ASC, id ASC
                     LIMIT 1"
                ))?;
                stmt.query_row(params![now], job_from_row).optional()?
            };

            match claimed {
                Some(job) => {
                    tx.execute(
                        "UPDATE outbox_jobs SET status = 'processing', locked_until = ?1,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?2",
                        params![lock_expiry, job.id],
                    )?;
                    tx.commit()?;
                    Ok(Some(OutboxJob {
                        status: "processing".to_string(),
                        locked_until: Some(lock_expiry),
                        ..job
                    }))
                }
                None => {
                    tx.commit()?;
                    Ok(None)
                }
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge successful delivery. The job row is removed; delivered mail
/// needs no tombstone.
pub async fn ack(db: &Database, id: i64) -> Result<(), ParlorError> {
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM outbox_jobs WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a retryable delivery failure.
///
/// Increments attempts. Below `max_attempts` the job returns to pending with
/// an exponential backoff delay (`backoff_base_ms * 2^(attempt-1)`); at the
/// cap it is parked as failed with the error kept for `queue failed`.
///
/// Returns `true` when another attempt was scheduled.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    backoff_base_ms: u64,
) -> Result<bool, ParlorError> {
    let error = error.to_string();
    let now_instant = parlor_core::time::now();
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts): (i64, i64) = conn.query_row(
                "SELECT attempts, max_attempts FROM outbox_jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            if new_attempts >= max_attempts {
                conn.execute(
                    "UPDATE outbox_jobs SET status = 'failed', attempts = ?1,
                     locked_until = NULL, last_error = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_attempts, error, id],
                )?;
                Ok(false)
            } else {
                let shift = u32::try_from(new_attempts - 1).unwrap_or(20).min(20);
                let delay_ms = backoff_base_ms.saturating_mul(1u64 << shift);
                let next_attempt_at = parlor_core::time::format(
                    now_instant + chrono::Duration::milliseconds(delay_ms as i64),
                );
                conn.execute(
                    "UPDATE outbox_jobs SET status = 'pending', attempts = ?1,
                     locked_until = NULL, last_error = ?2, next_attempt_at = ?3,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?4",
                    params![new_attempts, error, next_attempt_at, id],
                )?;
                Ok(true)
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Park a job as failed immediately, skipping remaining retries. Used for
/// errors that repeating cannot fix (bad credentials, rejected payload).
pub async fn fail_terminal(db: &Database, id: i64, error: &str) -> Result<(), ParlorError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE outbox_jobs SET status = 'failed', attempts = attempts + 1,
                 locked_until = NULL, last_error = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![error, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Requeue every failed job with a fresh attempt budget. Returns how many
/// jobs were requeued.
pub async fn retry_failed(db: &Database) -> Result<usize, ParlorError> {
    let now = parlor_core::time::format(parlor_core::time::now());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE outbox_jobs SET status = 'pending', attempts = 0,
                 last_error = NULL, locked_until = NULL, next_attempt_at = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'failed'",
                params![now],
            )?;
            Ok(changed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn list_failed(db: &Database) -> Result<Vec<OutboxJob>, ParlorError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM outbox_jobs WHERE status = 'failed' ORDER BY id"
            ))?;
            let jobs = stmt
                .query_map([], job_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(jobs)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn counts(db: &Database) -> Result<QueueCounts, ParlorError> {
    db.connection()
        .call(|conn| {
            let mut result = QueueCounts::default();
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM outbox_jobs GROUP BY status")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (status, count) in rows {
                match status.as_str() {
                    "pending" => result.pending = count,
                    "processing" => result.processing = count,
                    "failed" => result.failed = count,
                    _ => {}
                }
            }
            Ok(result)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_job(db: &Database, id: i64) -> Result<Option<OutboxJob>, ParlorError> {
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM outbox_jobs WHERE id = ?1"),
                    params![id],
                    job_from_row,
                )
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
