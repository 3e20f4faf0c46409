// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parlor queue` subcommands.
//!
//! Operator tooling for the outbound delivery queue: counts by status,
//! the failed-job list with recorded errors, and bulk requeue.

use parlor_config::ParlorConfig;
use parlor_core::ParlorError;
use parlor_storage::queries::outbox;
use parlor_storage::Database;
use serde::Serialize;

/// Structured counts for `--json` mode.
#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
}

/// One failed job, trimmed to what an operator needs to decide on a requeue.
#[derive(Debug, Serialize)]
pub struct FailedJobRow {
    pub id: i64,
    pub tenant_id: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub updated_at: String,
}

/// Run `parlor queue status`.
pub async fn run_status(config: &ParlorConfig, json: bool) -> Result<(), ParlorError> {
    let db = Database::open(&config.storage.database_path).await?;
    let counts = outbox::counts(&db).await;
    let close = db.close().await;
    let counts = counts?;
    close?;

    if json {
        let response = QueueStatusResponse {
            pending: counts.pending,
            processing: counts.processing,
            failed: counts.failed,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        println!();
        println!("  parlor queue status");
        println!("  {}", "-".repeat(35));
        println!("    Pending:     {}", counts.pending);
        println!("    Processing:  {}", counts.processing);
        println!("    Failed:      {}", counts.failed);
        println!();
    }

    Ok(())
}

/// Run `parlor queue failures`.
pub async fn run_failures(config: &ParlorConfig, json: bool) -> Result<(), ParlorError> {
    let db = Database::open(&config.storage.database_path).await?;
    let failed = outbox::list_failed(&db).await;
    let close = db.close().await;
    let failed = failed?;
    close?;

    let rows: Vec<FailedJobRow> = failed
        .into_iter()
        .map(|job| FailedJobRow {
            id: job.id,
            tenant_id: job.tenant_id,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            last_error: job.last_error,
            updated_at: job.updated_at,
        })
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }

    println!();
    println!("  parlor queue failures");
    println!("  {}", "-".repeat(35));
    if rows.is_empty() {
        println!("    No failed jobs.");
    } else {
        for row in &rows {
            println!(
                "    #{} tenant={} attempts={}/{}  {}",
                row.id,
                row.tenant_id,
                row.attempts,
                row.max_attempts,
                row.last_error.as_deref().unwrap_or("(no error recorded)")
            );
        }
        println!();
        println!("  Requeue with: parlor queue retry");
    }
    println!();

    Ok(())
}

/// Run `parlor queue retry`: requeue every failed job with a fresh budget.
pub async fn run_retry(config: &ParlorConfig) -> Result<(), ParlorError> {
    let db = Database::open(&config.storage.database_path).await?;
    let requeued = outbox::retry_failed(&db).await;
    let close = db.close().await;
    let requeued = requeued?;
    close?;

    if requeued == 0 {
        println!("No failed jobs to requeue.");
    } else {
        let job_word = if requeued == 1 { "job" } else { "jobs" };
        println!("Requeued {requeued} failed {job_word}.");
    }

    Ok(())
}
