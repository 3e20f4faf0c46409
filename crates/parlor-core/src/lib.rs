// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parlor reconciliation layer.
//!
//! This crate provides the shared error type, domain types, the pure identity
//! normalizer, and the collaborator traits through which external systems are
//! consumed. Behavior with I/O lives in the sibling crates.

pub mod error;
pub mod identity;
pub mod time;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParlorError;
pub use identity::CanonicalIdentity;
pub use types::{
    AliasResolution, Contact, Conversation, CrmCredentials, DeliveryPayload, Direction,
    IncomingMessage, JobLease, Message, OutboundDraft, OutboxJob, SummaryPatch, CRM_CHANNEL,
    EPOCH_SENTINEL,
};

pub use traits::{AliasResolver, CrmClient};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parlor_error_has_all_variants() {
        // Verify all 6 error variants exist and can be constructed.
        let _validation = ParlorError::Validation("test".into());
        let _storage = ParlorError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _delivery = ParlorError::Delivery {
            message: "test".into(),
            retryable: true,
            source: None,
        };
        let _config = ParlorError::Config("test".into());
        let _serialization = ParlorError::Serialization {
            source: Box::new(std::io::Error::other("test")),
        };
        let _internal = ParlorError::Internal("test".into());
    }

    #[test]
    fn retryability_follows_taxonomy() {
        assert!(
            ParlorError::Delivery {
                message: "timeout".into(),
                retryable: true,
                source: None,
            }
            .is_retryable()
        );
        assert!(
            !ParlorError::Delivery {
                message: "rejected".into(),
                retryable: false,
                source: None,
            }
            .is_retryable()
        );
        assert!(!ParlorError::Validation("bad".into()).is_retryable());
        assert!(!ParlorError::Internal("bug".into()).is_retryable());
    }

    #[test]
    fn direction_round_trips() {
        for d in [Direction::Inbound, Direction::Outbound] {
            assert_eq!(Direction::parse(d.as_str()), Some(d));
        }
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn contact_channel_id_map_round_trips() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("whatsapp".to_string(), "35799123456@s.whatsapp.net".to_string());
        map.insert("crm".to_string(), "ghl-42".to_string());
        let json = types::channel_ids_to_json(&map).unwrap();

        let contact = Contact {
            id: "c-1".into(),
            tenant_id: "t-1".into(),
            phone: Some("+35799123456".into()),
            email: None,
            channel_ids: json,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        assert_eq!(contact.channel_id_map().unwrap(), map);
        assert_eq!(contact.channel_id("crm").as_deref(), Some("ghl-42"));
        assert_eq!(contact.channel_id("sms"), None);
    }

    #[test]
    fn delivery_payload_snapshot_round_trips() {
        let payload = DeliveryPayload {
            tenant_id: "t-1".into(),
            contact_id: "c-1".into(),
            external_contact_id: Some("ghl-42".into()),
            provider_conversation_id: None,
            message_id: "m-1".into(),
            message_type: "SMS".into(),
            body: "viewing confirmed for 3pm".into(),
            contact_phone: Some("+35799123456".into()),
            contact_email: None,
            credentials: CrmCredentials {
                api_key: "key".into(),
                location_id: "loc".into(),
            },
        };
        let json = serde_json::to_string(&payload).unwrap();
        let job = OutboxJob {
            id: 1,
            tenant_id: "t-1".into(),
            payload: json,
            status: "pending".into(),
            attempts: 0,
            max_attempts: 3,
            next_attempt_at: "2026-01-01T00:00:00.000Z".into(),
            locked_until: None,
            last_error: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        assert_eq!(job.delivery_payload().unwrap(), payload);
    }
}
