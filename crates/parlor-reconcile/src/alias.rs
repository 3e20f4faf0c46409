// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background resolution of channel pseudo-identifiers to real numbers.
//!
//! Resolution goes through an injected [`AliasResolver`] (the channel's
//! lookup API). Misses are retried on a fixed delay until the attempt
//! budget runs out; the alias then stays the contact's identity for good.

use parlor_core::identity::normalize_phone;
use parlor_core::{AliasResolver, ParlorError};
use parlor_storage::queries::{aliases, contacts};
use parlor_storage::Database;
use tracing::{info, warn};

use crate::merge;

/// Outcome of one [`resolve_pending`] run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AliasReport {
    /// Aliases resolved to a real number this run.
    pub resolved: usize,
    /// Aliases deferred for another attempt.
    pub deferred: usize,
    /// Aliases that ran out of attempts this run.
    pub exhausted: usize,
}

/// Work through due pending aliases, at most `limit` per run.
///
/// A successful lookup writes the number onto the contact when it is still
/// free, then merges that contact's conversations; a number already owned
/// by another contact leaves the alias in place as the contact's identity.
pub async fn resolve_pending(
    db: &Database,
    resolver: &dyn AliasResolver,
    retry_delay_secs: u64,
    max_attempts: i64,
    limit: i64,
) -> Result<AliasReport, ParlorError> {
    let due = aliases::due_pending(db, limit).await?;
    let mut report = AliasReport::default();

    for row in due {
        let lookup = resolver.resolve(&row.tenant_id, &row.alias).await;
        let phone = match lookup {
            Ok(Some(raw)) => normalize_phone(&raw),
            Ok(None) => None,
            Err(e) => {
                warn!(alias = %row.alias, error = %e, "alias lookup failed");
                None
            }
        };

        match phone {
            Some(phone) => {
                if contacts::set_phone_if_free(db, &row.contact_id, &phone).await? {
                    info!(
                        contact_id = %row.contact_id,
                        alias = %row.alias,
                        phone = %phone,
                        "alias resolved to real number"
                    );
                    merge::merge_contact(db, &row.contact_id).await?;
                } else {
                    warn!(
                        contact_id = %row.contact_id,
                        alias = %row.alias,
                        "resolved number already owned, keeping alias identity"
                    );
                }
                aliases::mark_resolved(db, row.id).await?;
                report.resolved += 1;
            }
            None => {
                if aliases::defer_retry(db, row.id, retry_delay_secs, max_attempts).await? {
                    report.deferred += 1;
                } else {
                    warn!(
                        contact_id = %row.contact_id,
                        alias = %row.alias,
                        attempts = row.attempts + 1,
                        "alias resolution exhausted, alias stays as identity"
                    );
                    report.exhausted += 1;
                }
            }
        }
    }

    if report.resolved + report.deferred + report.exhausted > 0 {
        info!(
            resolved = report.resolved,
            deferred = report.deferred,
            exhausted = report.exhausted,
            "alias resolution pass finished"
        );
    }
    Ok(report)
}
