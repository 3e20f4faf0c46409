// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduling guard for Parlor's batch jobs.
//!
//! Two gates stand in front of every scheduled pass: a host resource check
//! (free memory, load average) and a database-backed lease giving the job
//! name to exactly one live holder at a time. [`run_guarded`] composes both
//! around a job future and guarantees the lease is released afterwards.

pub mod lease;
pub mod resources;

pub use lease::{run_guarded, GuardOutcome, JobGuard, DEFAULT_LEASE_TIMEOUT_SECS};
pub use resources::{
    check_resources, evaluate, probe, ResourceSnapshot, ResourceThresholds, ResourceVerdict,
};
