// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch pass collapsing duplicate live conversations per contact.

use parlor_core::ParlorError;
use parlor_storage::queries::conversations;
use parlor_storage::Database;
use tracing::{error, info};

/// Outcome of one [`merge_all`] run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeReport {
    /// Contacts that held more than one live conversation.
    pub contacts_examined: usize,
    /// Duplicate conversations removed across all contacts.
    pub conversations_merged: usize,
    /// Contacts whose merge failed and was skipped.
    pub failures: usize,
}

/// Merge one contact's conversations. Returns how many duplicates were
/// absorbed into the survivor.
pub async fn merge_contact(db: &Database, contact_id: &str) -> Result<usize, ParlorError> {
    let merged = conversations::merge_for_contact(db, contact_id).await?;
    if merged > 0 {
        info!(contact_id, merged, "merged duplicate conversations");
    }
    Ok(merged)
}

/// Merge every contact currently holding duplicate conversations.
///
/// Failures are isolated per contact: an error is logged and counted, and
/// the pass moves on. Re-running after a partial failure is safe since each
/// contact's merge is atomic and idempotent.
pub async fn merge_all(db: &Database) -> Result<MergeReport, ParlorError> {
    let contact_ids = conversations::contacts_with_duplicates(db).await?;
    let mut report = MergeReport {
        contacts_examined: contact_ids.len(),
        ..MergeReport::default()
    };

    for contact_id in contact_ids {
        match merge_contact(db, &contact_id).await {
            Ok(merged) => report.conversations_merged += merged,
            Err(e) => {
                error!(contact_id = %contact_id, error = %e, "merge failed, skipping contact");
                report.failures += 1;
            }
        }
    }

    info!(
        contacts = report.contacts_examined,
        merged = report.conversations_merged,
        failures = report.failures,
        "conversation merge pass finished"
    );
    Ok(report)
}
