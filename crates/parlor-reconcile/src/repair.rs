// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch pass restoring denormalized conversation summaries from the
//! message log.
//!
//! The online path updates summaries opportunistically and can lose races;
//! this pass makes the stored summary equal the newest message again.

use parlor_core::{ParlorError, SummaryPatch, EPOCH_SENTINEL};
use parlor_storage::queries::conversations;
use parlor_storage::Database;
use tracing::{error, info};

/// Outcome of one [`repair_summaries`] run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairReport {
    /// Live conversations examined, including empty ones.
    pub scanned: usize,
    /// Conversations whose summary was rewritten.
    pub updated: usize,
}

/// Whether a stored summary has drifted from the newest message beyond
/// `tolerance_ms`, or still carries the unset sentinel.
fn needs_repair(stored: &SummaryPatch, latest: &SummaryPatch, tolerance_ms: u64) -> bool {
    if stored.last_message_at == EPOCH_SENTINEL {
        return true;
    }
    let stored_at = match parlor_core::time::parse(&stored.last_message_at) {
        Ok(t) => t,
        // Unreadable stored value: rewrite it from the authoritative side.
        Err(_) => return true,
    };
    let latest_at = match parlor_core::time::parse(&latest.last_message_at) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let drift_ms = (latest_at - stored_at).num_milliseconds().abs();
    drift_ms > tolerance_ms as i64
}

/// Rewrite every live conversation summary that disagrees with its newest
/// message by more than `tolerance_ms`.
///
/// Conversations with no messages are counted as scanned and skipped.
/// Per-row failures are logged and do not stop the scan.
pub async fn repair_summaries(
    db: &Database,
    tolerance_ms: u64,
) -> Result<RepairReport, ParlorError> {
    let rows = conversations::summary_audit(db).await?;
    let mut report = RepairReport {
        scanned: rows.len(),
        ..RepairReport::default()
    };

    for row in rows {
        let Some(latest) = row.latest else {
            continue;
        };
        if !needs_repair(&row.stored, &latest, tolerance_ms) {
            continue;
        }
        match conversations::set_summary(db, &row.conversation_id, &latest).await {
            Ok(()) => {
                info!(
                    conversation_id = %row.conversation_id,
                    stored_at = %row.stored.last_message_at,
                    actual_at = %latest.last_message_at,
                    "repaired conversation summary"
                );
                report.updated += 1;
            }
            Err(e) => {
                error!(
                    conversation_id = %row.conversation_id,
                    error = %e,
                    "summary repair failed, continuing scan"
                );
            }
        }
    }

    info!(scanned = report.scanned, updated = report.updated, "summary repair pass finished");
    Ok(report)
}
