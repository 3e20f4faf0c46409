// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parlor serve` command implementation.
//!
//! Runs the durable sync worker and the scheduled reconciliation jobs in a
//! single process: duplicate-conversation merges, summary repair, retention
//! purge, and pseudo-identifier resolution, each behind the job guard.
//! Supports graceful shutdown via signal handlers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use croner::Cron;
use parlor_config::ParlorConfig;
use parlor_core::ParlorError;
use parlor_guard::GuardOutcome;
use parlor_storage::Database;
use parlor_sync::{HttpAliasResolver, HttpCrmClient, SyncWorker, WorkerSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::jobs;
use crate::shutdown;

/// Runs the `parlor serve` command.
///
/// Opens the database, starts one scheduler task per configured job, and
/// drives the sync worker in the foreground until a shutdown signal
/// arrives. In-flight deliveries and a mid-pass job both finish before the
/// process exits.
pub async fn run_serve(config: ParlorConfig) -> Result<(), ParlorError> {
    // Initialize tracing subscriber.
    init_tracing(&config.log.level);

    info!("starting parlor serve");

    let db = Database::open(&config.storage.database_path).await?;
    info!(path = %config.storage.database_path, "database ready");

    let client = Arc::new(HttpCrmClient::new(
        &config.crm.base_url,
        config.crm.timeout_secs,
    )?);
    let worker = SyncWorker::new(
        db.clone(),
        client,
        WorkerSettings {
            concurrency: config.queue.concurrency,
            rate_limit_per_sec: config.queue.rate_limit_per_sec,
            backoff_base_ms: config.queue.backoff_base_ms,
            lock_timeout_secs: config.queue.lock_timeout_secs,
            poll_interval_ms: config.queue.poll_interval_ms,
        },
    );

    // Install signal handler.
    let cancel = shutdown::install_signal_handler();

    let mut schedulers = Vec::new();

    schedulers.push(spawn_scheduled(
        jobs::MERGE_JOB,
        &config.schedule.merge,
        cancel.clone(),
        {
            let db = db.clone();
            let config = config.clone();
            move || {
                let db = db.clone();
                let config = config.clone();
                async move { jobs::guarded_merge(&db, &config).await }
            }
        },
    )?);

    schedulers.push(spawn_scheduled(
        jobs::REPAIR_JOB,
        &config.schedule.repair,
        cancel.clone(),
        {
            let db = db.clone();
            let config = config.clone();
            move || {
                let db = db.clone();
                let config = config.clone();
                async move { jobs::guarded_repair(&db, &config).await }
            }
        },
    )?);

    schedulers.push(spawn_scheduled(
        jobs::PURGE_JOB,
        &config.schedule.purge,
        cancel.clone(),
        {
            let db = db.clone();
            let config = config.clone();
            move || {
                let db = db.clone();
                let config = config.clone();
                async move { jobs::guarded_purge(&db, &config).await }
            }
        },
    )?);

    if config.directory.is_configured() {
        let resolver = Arc::new(HttpAliasResolver::new(
            &config.directory.base_url,
            &config.directory.api_key,
            &config.directory.instance,
            config.directory.timeout_secs,
        )?);
        schedulers.push(spawn_scheduled(
            jobs::ALIASES_JOB,
            &config.schedule.aliases,
            cancel.clone(),
            {
                let db = db.clone();
                let config = config.clone();
                move || {
                    let db = db.clone();
                    let config = config.clone();
                    let resolver = resolver.clone();
                    async move { jobs::guarded_aliases(&db, &config, resolver.as_ref()).await }
                }
            },
        )?);
    } else {
        info!("address directory not configured, pseudo-identifier resolution disabled");
    }

    info!(
        concurrency = config.queue.concurrency,
        rate_limit_per_sec = config.queue.rate_limit_per_sec,
        "sync worker starting"
    );
    worker.run(cancel.clone()).await;

    // The token is cancelled once the worker returns; each scheduler exits
    // after finishing any pass it is in.
    for handle in schedulers {
        let _ = handle.await;
    }

    db.close().await?;
    info!("parlor serve shutdown complete");
    Ok(())
}

/// Parse `expr` and spawn a loop that runs `job` at each occurrence until
/// `cancel` fires. Schedules use standard five-field cron syntax.
fn spawn_scheduled<F, Fut, T>(
    name: &'static str,
    expr: &str,
    cancel: CancellationToken,
    job: F,
) -> Result<JoinHandle<()>, ParlorError>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<GuardOutcome<T>, ParlorError>> + Send + 'static,
    T: std::fmt::Debug + Send + 'static,
{
    let cron = expr
        .parse::<Cron>()
        .map_err(|e| ParlorError::Config(format!("invalid {name} schedule `{expr}`: {e}")))?;
    let expr = expr.to_string();

    let handle = tokio::spawn(async move {
        info!(job = name, schedule = %expr, "job scheduled");
        loop {
            let next = match cron.find_next_occurrence(&Utc::now(), false) {
                Ok(next) => next,
                Err(e) => {
                    error!(job = name, error = %e, "schedule has no next occurrence, scheduler stopping");
                    break;
                }
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            match job().await {
                Ok(GuardOutcome::Ran(report)) => {
                    info!(job = name, report = ?report, "scheduled run finished");
                }
                Ok(GuardOutcome::SkippedResources { reason }) => {
                    warn!(job = name, reason = %reason, "scheduled run skipped");
                }
                Ok(GuardOutcome::SkippedHeld) => {
                    info!(job = name, "scheduled run skipped, lease held elsewhere");
                }
                Err(e) => {
                    error!(job = name, error = %e, "scheduled run failed");
                }
            }
        }
        debug!(job = name, "scheduler stopped");
    });

    Ok(handle)
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = std::env::var("PARLOR_LOG")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(format!("parlor={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
