// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host resource checks gating scheduled jobs.
//!
//! Batch passes share the host with the interactive path, so each tick asks
//! whether there is headroom before doing any work. The check is a pure read
//! of free memory and the 1-minute load average; it never mutates anything.

use sysinfo::System;

/// Caller-supplied limits a host must satisfy before a job may run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceThresholds {
    /// Minimum free memory in MB.
    pub min_free_mb: u64,
    /// Maximum 1-minute load average.
    pub max_load: f64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            min_free_mb: 500,
            max_load: 4.0,
        }
    }
}

/// Point-in-time reading of the host resources the guard looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub free_mb: u64,
    pub load_one: f64,
}

/// Outcome of a resource check.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceVerdict {
    Ok,
    Rejected { reason: String },
}

impl ResourceVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResourceVerdict::Ok)
    }
}

/// Judge a snapshot against thresholds. Memory is checked before load, so a
/// host failing both reports the memory reason.
pub fn evaluate(snapshot: &ResourceSnapshot, thresholds: &ResourceThresholds) -> ResourceVerdict {
    if snapshot.free_mb < thresholds.min_free_mb {
        return ResourceVerdict::Rejected {
            reason: format!(
                "Low memory: {}MB free (min: {}MB)",
                snapshot.free_mb, thresholds.min_free_mb
            ),
        };
    }

    if snapshot.load_one > thresholds.max_load {
        return ResourceVerdict::Rejected {
            reason: format!(
                "High load: {:.2} (max: {})",
                snapshot.load_one, thresholds.max_load
            ),
        };
    }

    ResourceVerdict::Ok
}

/// Read the live host state and judge it against `thresholds`.
pub fn check_resources(thresholds: &ResourceThresholds) -> ResourceVerdict {
    evaluate(&probe(), thresholds)
}

/// Take a live reading of the host.
pub fn probe() -> ResourceSnapshot {
    let mut system = System::new();
    system.refresh_memory();
    // available_memory counts reclaimable cache, which is what actually
    // bounds whether another batch pass fits.
    let free_mb = system.available_memory() / 1024 / 1024;
    let load_one = System::load_average().one;
    ResourceSnapshot { free_mb, load_one }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ResourceThresholds {
        ResourceThresholds {
            min_free_mb: 500,
            max_load: 4.0,
        }
    }

    #[test]
    fn healthy_host_passes() {
        let snapshot = ResourceSnapshot {
            free_mb: 2048,
            load_one: 0.8,
        };
        assert!(evaluate(&snapshot, &thresholds()).is_ok());
    }

    #[test]
    fn low_memory_is_rejected_with_memory_reason() {
        let snapshot = ResourceSnapshot {
            free_mb: 300,
            load_one: 0.5,
        };
        let ResourceVerdict::Rejected { reason } = evaluate(&snapshot, &thresholds()) else {
            panic!("expected rejection");
        };
        assert_eq!(reason, "Low memory: 300MB free (min: 500MB)");
    }

    #[test]
    fn high_load_is_rejected_with_load_reason() {
        let snapshot = ResourceSnapshot {
            free_mb: 2048,
            load_one: 5.25,
        };
        let ResourceVerdict::Rejected { reason } = evaluate(&snapshot, &thresholds()) else {
            panic!("expected rejection");
        };
        assert_eq!(reason, "High load: 5.25 (max: 4)");
    }

    #[test]
    fn memory_reason_wins_when_both_limits_are_breached() {
        let snapshot = ResourceSnapshot {
            free_mb: 100,
            load_one: 9.0,
        };
        let ResourceVerdict::Rejected { reason } = evaluate(&snapshot, &thresholds()) else {
            panic!("expected rejection");
        };
        assert!(reason.starts_with("Low memory"), "got: {reason}");
    }

    #[test]
    fn limits_are_strict_comparisons() {
        // Exactly at the limit passes on both axes.
        let snapshot = ResourceSnapshot {
            free_mb: 500,
            load_one: 4.0,
        };
        assert!(evaluate(&snapshot, &thresholds()).is_ok());
    }

    #[test]
    fn live_probe_produces_a_verdict() {
        // Thresholds no real host can fail, and thresholds none can pass.
        let permissive = ResourceThresholds {
            min_free_mb: 0,
            max_load: f64::MAX,
        };
        assert!(check_resources(&permissive).is_ok());

        let impossible = ResourceThresholds {
            min_free_mb: u64::MAX,
            max_load: f64::MAX,
        };
        assert!(!check_resources(&impossible).is_ok());
    }
}
