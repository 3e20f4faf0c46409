// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Partner-CRM client trait, invoked only by the outbound sync worker.

use async_trait::async_trait;

use crate::error::ParlorError;
use crate::types::DeliveryPayload;

/// Client for the external partner CRM.
///
/// Implementations map transport faults onto [`ParlorError::Delivery`] with
/// `retryable` set for timeouts, connection errors, throttling, and server
/// errors; other rejections are terminal.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Deliver one message snapshot. Returns the CRM-side message id.
    ///
    /// The payload must already carry an `external_contact_id`; callers that
    /// hold a snapshot without one resolve it via [`CrmClient::ensure_contact`]
    /// first.
    async fn send_message(&self, payload: &DeliveryPayload) -> Result<String, ParlorError>;

    /// Find or create the CRM-side contact for this payload's person.
    ///
    /// Searches by phone, then email, then creates. Returns the CRM contact id.
    async fn ensure_contact(&self, payload: &DeliveryPayload) -> Result<String, ParlorError>;
}
