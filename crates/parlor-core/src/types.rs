// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Parlor workspace.
//!
//! Row-mirroring structs keep timestamps as RFC 3339 strings with millisecond
//! precision (`2026-01-01T00:00:00.000Z`), the same format SQLite's
//! `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` produces, so chronological ordering
//! and comparison work both in SQL and on the raw strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ParlorError;

/// Summary timestamp value meaning "no message recorded yet".
///
/// Conversations are created with this sentinel and any real message
/// timestamp sorts after it.
pub const EPOCH_SENTINEL: &str = "1970-01-01T00:00:00.000Z";

/// Channel-id map key under which a contact's partner-CRM id is stored.
pub const CRM_CHANNEL: &str = "crm";

/// Direction of a message relative to the tenant's operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "inbound" => Some(Direction::Inbound),
            "outbound" => Some(Direction::Outbound),
            _ => None,
        }
    }
}

/// Tenant-scoped identity record. One row per distinct person per tenant.
///
/// `channel_ids` is a JSON object mapping channel name to that channel's
/// external id for this contact (chat address, mailbox address, partner-CRM
/// contact id, or an unresolved pseudo-identifier).
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: String,
    pub tenant_id: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub channel_ids: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Contact {
    /// Parse the `channel_ids` JSON column into a map.
    pub fn channel_id_map(&self) -> Result<BTreeMap<String, String>, ParlorError> {
        if self.channel_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&self.channel_ids)
            .map_err(|e| ParlorError::Serialization { source: Box::new(e) })
    }

    /// External id recorded for the given channel, if any.
    pub fn channel_id(&self, channel: &str) -> Option<String> {
        self.channel_id_map().ok().and_then(|m| m.get(channel).cloned())
    }
}

/// Serialize a channel-id map back to its JSON column form.
pub fn channel_ids_to_json(map: &BTreeMap<String, String>) -> Result<String, ParlorError> {
    serde_json::to_string(map).map_err(|e| ParlorError::Serialization { source: Box::new(e) })
}

/// Tenant-scoped conversation thread belonging to exactly one contact.
///
/// The `last_message_*` fields are a denormalized copy of the newest message,
/// kept for fast listing. They are updated opportunistically on ingestion and
/// restored by the summary repair pass when they drift.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub contact_id: String,
    pub tenant_id: String,
    pub status: String,
    pub trashed_at: Option<String>,
    pub unread_count: i64,
    pub last_message_at: String,
    pub last_message_body: String,
    pub last_message_type: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Immutable record of one inbound or outbound communication.
///
/// `external_id` is the channel's own message id; a unique index on
/// `(channel, external_id)` makes re-delivery of the same event a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub tenant_id: String,
    pub direction: String,
    pub body: String,
    pub message_type: String,
    pub channel: String,
    pub external_id: Option<String>,
    pub created_at: String,
}

/// Denormalized summary values to write onto a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryPatch {
    pub last_message_at: String,
    pub last_message_body: String,
    pub last_message_type: String,
}

/// Raw event handed over by an ingestion adapter.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub tenant_id: String,
    pub channel: String,
    /// Sender address as the channel sees it (phone in any format, mailbox
    /// address, or a channel pseudo-identifier).
    pub raw_address: String,
    pub body: String,
    pub message_type: String,
    /// Channel-unique id of this event, used for idempotent re-ingestion.
    pub external_id: Option<String>,
    pub direction: Direction,
    /// When the event happened on the channel, RFC 3339.
    pub occurred_at: String,
}

/// A locally authored operator reply, written before delivery is queued.
#[derive(Debug, Clone)]
pub struct OutboundDraft {
    pub tenant_id: String,
    pub contact_id: String,
    pub body: String,
    pub message_type: String,
    pub credentials: CrmCredentials,
}

/// Credentials for the partner CRM, captured into each delivery snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmCredentials {
    pub api_key: String,
    pub location_id: String,
}

/// Fully-resolved delivery snapshot captured at enqueue time.
///
/// Retries never re-derive any of these fields from mutable state; what was
/// enqueued is exactly what gets delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub tenant_id: String,
    pub contact_id: String,
    /// Partner-CRM contact id, when already known at enqueue time. When
    /// absent the worker resolves one remotely before sending, without
    /// rewriting the stored snapshot.
    pub external_contact_id: Option<String>,
    /// Provider-side conversation id, when the partner CRM tracks one.
    pub provider_conversation_id: Option<String>,
    pub message_id: String,
    pub message_type: String,
    pub body: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub credentials: CrmCredentials,
}

/// One durable entry in the outbound sync queue.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxJob {
    pub id: i64,
    pub tenant_id: String,
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub next_attempt_at: String,
    pub locked_until: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl OutboxJob {
    /// Decode the enqueue-time snapshot.
    pub fn delivery_payload(&self) -> Result<DeliveryPayload, ParlorError> {
        serde_json::from_str(&self.payload)
            .map_err(|e| ParlorError::Serialization { source: Box::new(e) })
    }
}

/// Exclusive, time-bounded claim on the right to run a named job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobLease {
    pub job_name: String,
    pub holder_id: String,
    pub acquired_at: String,
}

/// A pseudo-identifier awaiting resolution to a real address.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasResolution {
    pub id: i64,
    pub tenant_id: String,
    pub channel: String,
    pub alias: String,
    pub contact_id: String,
    pub status: String,
    pub attempts: i64,
    pub next_attempt_at: String,
    pub created_at: String,
    pub updated_at: String,
}
