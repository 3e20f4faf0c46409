// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue worker that drains `outbox_jobs` into the partner CRM.
//!
//! Each claimed job is delivered exactly as its enqueue-time snapshot says;
//! nothing is re-read from contacts or conversations at send time. Outcomes
//! are recorded through the outbox queries, so a crash between claim and
//! record leaves a locked job that a later claim reclaims after the lock
//! expires.

use std::sync::Arc;
use std::time::Duration;

use parlor_core::{CrmClient, OutboxJob, ParlorError, CRM_CHANNEL};
use parlor_storage::queries::{contacts, outbox};
use parlor_storage::Database;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tuning knobs for the delivery loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Deliveries in flight at once.
    pub concurrency: u32,
    /// Upper bound on job starts per second.
    pub rate_limit_per_sec: u32,
    /// First retry delay; doubles on each further failure.
    pub backoff_base_ms: u64,
    /// How long a claim stays exclusive before another worker may steal it.
    pub lock_timeout_secs: u64,
    /// Sleep between polls when the queue is empty.
    pub poll_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            rate_limit_per_sec: 5,
            backoff_base_ms: 1000,
            lock_timeout_secs: 300,
            poll_interval_ms: 500,
        }
    }
}

/// Drains the outbox into the partner CRM.
#[derive(Clone)]
pub struct SyncWorker {
    db: Database,
    client: Arc<dyn CrmClient>,
    settings: WorkerSettings,
}

impl SyncWorker {
    pub fn new(db: Database, client: Arc<dyn CrmClient>, settings: WorkerSettings) -> Self {
        Self {
            db,
            client,
            settings,
        }
    }

    /// Run the claim loop until `shutdown` fires.
    ///
    /// Shutdown stops claiming immediately but never cancels a delivery
    /// already in flight; this future resolves once the last one has
    /// recorded its outcome.
    pub async fn run(&self, shutdown: CancellationToken) {
        let limit = self.settings.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(limit as usize));
        let start_gap =
            Duration::from_millis(1000 / u64::from(self.settings.rate_limit_per_sec.max(1)));
        let poll = Duration::from_millis(self.settings.poll_interval_ms.max(1));

        info!(
            concurrency = limit,
            rate_limit_per_sec = self.settings.rate_limit_per_sec,
            "sync worker started"
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let claimed = match outbox::dequeue(&self.db, self.settings.lock_timeout_secs).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(error = %e, "failed to claim outbox job");
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(poll) => {}
                    }
                    continue;
                }
            };

            let Some(job) = claimed else {
                drop(permit);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll) => {}
                }
                continue;
            };

            let worker = self.clone();
            tokio::spawn(async move {
                if let Err(e) = worker.handle(job).await {
                    error!(error = %e, "failed to record delivery outcome");
                }
                drop(permit);
            });

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(start_gap) => {}
            }
        }

        // Wait for in-flight deliveries before returning.
        let _ = semaphore.acquire_many(limit).await;
        info!("sync worker stopped");
    }

    /// Claim and handle a single due job. Returns the job id, or `None`
    /// when nothing was due.
    pub async fn process_next(&self) -> Result<Option<i64>, ParlorError> {
        let Some(job) = outbox::dequeue(&self.db, self.settings.lock_timeout_secs).await? else {
            return Ok(None);
        };
        let id = job.id;
        self.handle(job).await?;
        Ok(Some(id))
    }

    /// Deliver one claimed job and record the outcome on its row.
    ///
    /// Errors returned here are storage failures while recording; delivery
    /// failures themselves land in the job's `last_error`.
    async fn handle(&self, job: OutboxJob) -> Result<(), ParlorError> {
        match self.deliver(&job).await {
            Ok(()) => {
                outbox::ack(&self.db, job.id).await?;
                info!(job_id = job.id, tenant_id = %job.tenant_id, "delivery acknowledged");
            }
            Err(e) if e.is_retryable() => {
                let rescheduled =
                    outbox::fail(&self.db, job.id, &e.to_string(), self.settings.backoff_base_ms)
                        .await?;
                if rescheduled {
                    warn!(job_id = job.id, error = %e, "delivery failed, retry scheduled");
                } else {
                    error!(job_id = job.id, error = %e, "delivery failed, attempts exhausted");
                }
            }
            Err(e) => {
                outbox::fail_terminal(&self.db, job.id, &e.to_string()).await?;
                error!(job_id = job.id, error = %e, "delivery rejected, parked as failed");
            }
        }
        Ok(())
    }

    async fn deliver(&self, job: &OutboxJob) -> Result<(), ParlorError> {
        let mut payload = job.delivery_payload()?;

        if payload.external_contact_id.is_none() {
            let external_id = self.client.ensure_contact(&payload).await?;
            // Record the discovered id on the contact so later enqueues
            // skip this round trip. The stored snapshot stays as enqueued.
            contacts::merge_channel_id(&self.db, &payload.contact_id, CRM_CHANNEL, &external_id)
                .await?;
            payload.external_contact_id = Some(external_id);
        }

        let provider_message_id = self.client.send_message(&payload).await?;
        debug!(
            job_id = job.id,
            provider_message_id = %provider_message_id,
            "message delivered"
        );
        Ok(())
    }
}
