// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Guarded reconciliation jobs and their one-shot commands.
//!
//! Each job runs under [`run_guarded`], so a one-shot invocation and a
//! scheduled run inside `parlor serve` obey the same resource thresholds
//! and the same per-job lease against the shared database.

use parlor_config::ParlorConfig;
use parlor_core::{AliasResolver, ParlorError};
use parlor_guard::{run_guarded, GuardOutcome, ResourceThresholds};
use parlor_reconcile::{merge_all, purge_trash, repair_summaries, resolve_pending};
use parlor_reconcile::{AliasReport, MergeReport, PurgeReport, RepairReport};
use parlor_storage::Database;
use parlor_sync::HttpAliasResolver;

/// Lease names for the periodic jobs. One name, one live run.
pub const MERGE_JOB: &str = "merge";
pub const REPAIR_JOB: &str = "repair";
pub const PURGE_JOB: &str = "purge";
pub const ALIASES_JOB: &str = "aliases";

/// Aliases attempted per resolution pass. Bounds directory traffic when the
/// backlog is deep; the next pass picks up where this one stopped.
pub const ALIAS_BATCH_LIMIT: i64 = 50;

fn thresholds(config: &ParlorConfig) -> ResourceThresholds {
    ResourceThresholds {
        min_free_mb: config.guard.min_free_memory_mb,
        max_load: config.guard.max_load_average,
    }
}

pub async fn guarded_merge(
    db: &Database,
    config: &ParlorConfig,
) -> Result<GuardOutcome<MergeReport>, ParlorError> {
    run_guarded(
        db,
        MERGE_JOB,
        &thresholds(config),
        config.guard.lease_timeout_secs,
        || async { merge_all(db).await },
    )
    .await
}

pub async fn guarded_repair(
    db: &Database,
    config: &ParlorConfig,
) -> Result<GuardOutcome<RepairReport>, ParlorError> {
    run_guarded(
        db,
        REPAIR_JOB,
        &thresholds(config),
        config.guard.lease_timeout_secs,
        || async { repair_summaries(db, config.repair.tolerance_ms).await },
    )
    .await
}

pub async fn guarded_purge(
    db: &Database,
    config: &ParlorConfig,
) -> Result<GuardOutcome<PurgeReport>, ParlorError> {
    run_guarded(
        db,
        PURGE_JOB,
        &thresholds(config),
        config.guard.lease_timeout_secs,
        || async { purge_trash(db, config.retention.trash_days).await },
    )
    .await
}

pub async fn guarded_aliases(
    db: &Database,
    config: &ParlorConfig,
    resolver: &dyn AliasResolver,
) -> Result<GuardOutcome<AliasReport>, ParlorError> {
    run_guarded(
        db,
        ALIASES_JOB,
        &thresholds(config),
        config.guard.lease_timeout_secs,
        || async {
            resolve_pending(
                db,
                resolver,
                config.alias.retry_delay_secs,
                i64::from(config.alias.max_attempts),
                ALIAS_BATCH_LIMIT,
            )
            .await
        },
    )
    .await
}

fn print_header(title: &str) {
    println!();
    println!("  {title}");
    println!("  {}", "-".repeat(35));
}

/// Print the skip line for a job that was gated off.
fn print_skipped<T>(outcome: &GuardOutcome<T>) {
    match outcome {
        GuardOutcome::Ran(_) => {}
        GuardOutcome::SkippedResources { reason } => println!("    Skipped: {reason}"),
        GuardOutcome::SkippedHeld => {
            println!("    Skipped: another run holds the job lease")
        }
    }
}

/// Run the `parlor merge` command: one guarded merge pass, then exit.
pub async fn run_merge(config: &ParlorConfig) -> Result<(), ParlorError> {
    let db = Database::open(&config.storage.database_path).await?;
    let outcome = guarded_merge(&db, config).await;
    let close = db.close().await;
    let outcome = outcome?;
    close?;

    print_header("parlor merge");
    match outcome {
        GuardOutcome::Ran(report) => {
            println!("    Contacts examined:     {}", report.contacts_examined);
            println!("    Conversations merged:  {}", report.conversations_merged);
            println!("    Failures:              {}", report.failures);
        }
        other => print_skipped(&other),
    }
    println!();
    Ok(())
}

/// Run the `parlor repair` command: one guarded summary-repair pass.
pub async fn run_repair(config: &ParlorConfig) -> Result<(), ParlorError> {
    let db = Database::open(&config.storage.database_path).await?;
    let outcome = guarded_repair(&db, config).await;
    let close = db.close().await;
    let outcome = outcome?;
    close?;

    print_header("parlor repair");
    match outcome {
        GuardOutcome::Ran(report) => {
            println!("    Conversations scanned:  {}", report.scanned);
            println!("    Summaries rewritten:    {}", report.updated);
        }
        other => print_skipped(&other),
    }
    println!();
    Ok(())
}

/// Run the `parlor purge` command: one guarded retention purge.
pub async fn run_purge(config: &ParlorConfig) -> Result<(), ParlorError> {
    let db = Database::open(&config.storage.database_path).await?;
    let outcome = guarded_purge(&db, config).await;
    let close = db.close().await;
    let outcome = outcome?;
    close?;

    print_header("parlor purge");
    match outcome {
        GuardOutcome::Ran(report) => {
            println!("    Conversations deleted:  {}", report.conversations);
            println!("    Messages deleted:       {}", report.messages);
        }
        other => print_skipped(&other),
    }
    println!();
    Ok(())
}

/// Run the `parlor resolve-aliases` command: one guarded resolution pass
/// against the chat provider's address directory.
pub async fn run_resolve_aliases(config: &ParlorConfig) -> Result<(), ParlorError> {
    if !config.directory.is_configured() {
        return Err(ParlorError::Config(
            "address directory is not configured; set directory.api_key".to_string(),
        ));
    }
    let resolver = HttpAliasResolver::new(
        &config.directory.base_url,
        &config.directory.api_key,
        &config.directory.instance,
        config.directory.timeout_secs,
    )?;

    let db = Database::open(&config.storage.database_path).await?;
    let outcome = guarded_aliases(&db, config, &resolver).await;
    let close = db.close().await;
    let outcome = outcome?;
    close?;

    print_header("parlor resolve-aliases");
    match outcome {
        GuardOutcome::Ran(report) => {
            println!("    Resolved:   {}", report.resolved);
            println!("    Deferred:   {}", report.deferred);
            println!("    Exhausted:  {}", report.exhausted);
        }
        other => print_skipped(&other),
    }
    println!();
    Ok(())
}
