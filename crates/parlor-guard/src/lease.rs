// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named, time-bounded mutual exclusion for scheduled jobs.
//!
//! The lease lives in the database, not the filesystem, so exclusion holds
//! across every host pointed at the same database. A holder that crashes
//! leaves its row behind; the row's age is the crash signal, and acquisition
//! reclaims any lease older than the staleness timeout.

use std::future::Future;

use parlor_core::ParlorError;
use parlor_storage::queries::leases;
use parlor_storage::Database;
use sysinfo::System;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::resources::{check_resources, ResourceThresholds, ResourceVerdict};

/// Default staleness timeout after which a lease is presumed abandoned.
pub const DEFAULT_LEASE_TIMEOUT_SECS: u64 = 3600;

/// One process's claim ticket for a named job.
///
/// The holder id is unique per guard instance, so two guards in one process
/// still exclude each other.
#[derive(Debug, Clone)]
pub struct JobGuard {
    job_name: String,
    holder_id: String,
    stale_secs: u64,
}

impl JobGuard {
    pub fn new(job_name: impl Into<String>, stale_secs: u64) -> Self {
        Self {
            job_name: job_name.into(),
            holder_id: holder_identity(),
            stale_secs,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Try to take the lease. `false` means another live holder has it.
    pub async fn acquire(&self, db: &Database) -> Result<bool, ParlorError> {
        let acquired =
            leases::try_acquire(db, &self.job_name, &self.holder_id, self.stale_secs).await?;
        if acquired {
            debug!(job = %self.job_name, holder = %self.holder_id, "lease acquired");
        }
        Ok(acquired)
    }

    /// Give the lease back. Releasing a lease that is already gone, or that
    /// another holder reclaimed in the meantime, is not an error.
    pub async fn release(&self, db: &Database) -> Result<(), ParlorError> {
        let released = leases::release(db, &self.job_name, &self.holder_id).await?;
        if released {
            debug!(job = %self.job_name, holder = %self.holder_id, "lease released");
        }
        Ok(())
    }
}

/// How a guarded run ended.
#[derive(Debug, PartialEq)]
pub enum GuardOutcome<T> {
    /// The job ran to completion; its report is inside.
    Ran(T),
    /// The host failed the resource check; nothing was acquired or run.
    SkippedResources { reason: String },
    /// Another live holder owns the lease.
    SkippedHeld,
}

impl<T> GuardOutcome<T> {
    pub fn ran(&self) -> bool {
        matches!(self, GuardOutcome::Ran(_))
    }
}

/// Check resources, take the lease, run the job, release the lease.
///
/// The release happens on the job's error path too; only a release that
/// itself fails can leave the row behind, and staleness reclaims it.
pub async fn run_guarded<F, Fut, T>(
    db: &Database,
    job_name: &str,
    thresholds: &ResourceThresholds,
    stale_secs: u64,
    job: F,
) -> Result<GuardOutcome<T>, ParlorError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ParlorError>>,
{
    if let ResourceVerdict::Rejected { reason } = check_resources(thresholds) {
        warn!(job = job_name, reason = %reason, "skipping job, host resources low");
        return Ok(GuardOutcome::SkippedResources { reason });
    }

    let guard = JobGuard::new(job_name, stale_secs);
    if !guard.acquire(db).await? {
        info!(job = job_name, "skipping job, lease held by another run");
        return Ok(GuardOutcome::SkippedHeld);
    }

    let result = job().await;
    let release_result = guard.release(db).await;
    let value = result?;
    release_result?;
    Ok(GuardOutcome::Ran(value))
}

/// `{hostname}:{pid}:{uuid}` so operators can see who holds a lease.
fn holder_identity() -> String {
    let host = System::host_name().unwrap_or_else(|| "unknown-host".to_string());
    format!("{host}:{}:{}", std::process::id(), Uuid::new_v4())
}
