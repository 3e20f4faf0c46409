// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attaching channel events to contacts and conversations, and authoring
//! local replies into the delivery outbox.

use parlor_core::{
    CanonicalIdentity, DeliveryPayload, IncomingMessage, Message, OutboundDraft, ParlorError,
    SummaryPatch, CRM_CHANNEL,
};
use parlor_storage::queries::{aliases, contacts, messages, outbox};
use parlor_storage::Database;
use tracing::{info, warn};
use uuid::Uuid;

use crate::resolver;

/// Channel name recorded on locally authored replies.
pub const LOCAL_CHANNEL: &str = "app";

/// How far into the future an event timestamp may lie before it is barred
/// from steering conversation state. Covers channel clock drift.
const MAX_FUTURE_DRIFT_HOURS: i64 = 24;

/// Result of ingesting one channel event.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Ingested(Message),
    /// The event was delivered before; nothing was written.
    AlreadyIngested { existing_id: String },
}

/// A locally authored reply together with its delivery job.
#[derive(Debug, Clone)]
pub struct AuthoredMessage {
    pub message: Message,
    pub job_id: i64,
}

/// Ingest one inbound or provider-echoed event.
///
/// Resolves the sender to a contact and its live conversation, stores the
/// message, and applies summary/unread effects. Replayed events (same
/// channel and external id) come back as [`IngestOutcome::AlreadyIngested`].
/// Pseudo-identifier senders additionally get a pending alias-resolution
/// row so the real number can be attached later.
pub async fn ingest_message(
    db: &Database,
    incoming: &IncomingMessage,
) -> Result<IngestOutcome, ParlorError> {
    if incoming.tenant_id.trim().is_empty() {
        return Err(ParlorError::Validation("empty tenant id".into()));
    }
    let occurred_at = parlor_core::time::parse(&incoming.occurred_at).map_err(|_| {
        ParlorError::Validation(format!("unparseable timestamp: {}", incoming.occurred_at))
    })?;

    // Replays are the common no-op; skip resolution work for them. The
    // unique index inside the insert still catches racing first deliveries.
    if let Some(external_id) = &incoming.external_id {
        if let Some(existing_id) =
            messages::find_ingested_id(db, &incoming.channel, external_id).await?
        {
            info!(
                existing_id = %existing_id,
                channel = %incoming.channel,
                "dropped replayed event"
            );
            return Ok(IngestOutcome::AlreadyIngested { existing_id });
        }
    }

    let identity = CanonicalIdentity::from_raw(&incoming.raw_address)?;
    let contact =
        resolver::resolve_contact(db, &incoming.tenant_id, &identity, &incoming.channel).await?;

    if let Some(alias) = &identity.alias {
        if aliases::upsert_pending(db, &incoming.tenant_id, &incoming.channel, alias, &contact.id)
            .await?
        {
            info!(contact_id = %contact.id, alias = %alias, "queued alias for resolution");
        }
    }

    let conversation = resolver::resolve_conversation(db, &contact).await?;

    let created_at = parlor_core::time::format(occurred_at);
    let max_future =
        parlor_core::time::now() + chrono::Duration::hours(MAX_FUTURE_DRIFT_HOURS);
    let summary = if occurred_at > max_future {
        warn!(
            conversation_id = %conversation.id,
            occurred_at = %created_at,
            "event timestamp too far in the future, storing without conversation effects"
        );
        None
    } else {
        Some(SummaryPatch {
            last_message_at: created_at.clone(),
            last_message_body: incoming.body.clone(),
            last_message_type: incoming.message_type.clone(),
        })
    };

    let message = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation.id.clone(),
        tenant_id: incoming.tenant_id.clone(),
        direction: incoming.direction.as_str().to_string(),
        body: incoming.body.clone(),
        message_type: incoming.message_type.clone(),
        channel: incoming.channel.clone(),
        external_id: incoming.external_id.clone(),
        created_at,
    };

    match messages::insert_ingested(db, &message, summary.as_ref()).await? {
        messages::StoredMessage::Inserted(stored) => {
            info!(
                message_id = %stored.id,
                conversation_id = %conversation.id,
                channel = %incoming.channel,
                direction = %stored.direction,
                "ingested message"
            );
            Ok(IngestOutcome::Ingested(stored))
        }
        messages::StoredMessage::Duplicate { existing_id } => {
            info!(
                existing_id = %existing_id,
                channel = %incoming.channel,
                "dropped replayed event"
            );
            Ok(IngestOutcome::AlreadyIngested { existing_id })
        }
    }
}

/// Store a locally authored reply and enqueue its delivery snapshot.
///
/// The payload captures everything the worker needs at this instant;
/// later contact edits do not change what gets sent.
pub async fn author_message(
    db: &Database,
    draft: &OutboundDraft,
    max_attempts: i64,
) -> Result<AuthoredMessage, ParlorError> {
    let contact = contacts::get_contact(db, &draft.contact_id)
        .await?
        .ok_or_else(|| {
            ParlorError::Validation(format!("unknown contact: {}", draft.contact_id))
        })?;
    if contact.tenant_id != draft.tenant_id {
        return Err(ParlorError::Validation(format!(
            "contact {} does not belong to tenant {}",
            draft.contact_id, draft.tenant_id
        )));
    }

    let conversation = resolver::resolve_conversation(db, &contact).await?;
    let now = parlor_core::time::format(parlor_core::time::now());
    let message = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation.id.clone(),
        tenant_id: draft.tenant_id.clone(),
        direction: "outbound".to_string(),
        body: draft.body.clone(),
        message_type: draft.message_type.clone(),
        channel: LOCAL_CHANNEL.to_string(),
        external_id: None,
        created_at: now.clone(),
    };
    let summary = SummaryPatch {
        last_message_at: now,
        last_message_body: draft.body.clone(),
        last_message_type: draft.message_type.clone(),
    };
    messages::insert_ingested(db, &message, Some(&summary)).await?;

    let payload = DeliveryPayload {
        tenant_id: draft.tenant_id.clone(),
        contact_id: contact.id.clone(),
        external_contact_id: contact.channel_id(CRM_CHANNEL),
        provider_conversation_id: None,
        message_id: message.id.clone(),
        message_type: draft.message_type.clone(),
        body: draft.body.clone(),
        contact_phone: contact.phone.clone(),
        contact_email: contact.email.clone(),
        credentials: draft.credentials.clone(),
    };
    let job_id = outbox::enqueue(db, &payload, max_attempts).await?;
    info!(message_id = %message.id, job_id, "authored reply queued for delivery");

    Ok(AuthoredMessage { message, job_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::{CrmCredentials, Direction, EPOCH_SENTINEL};
    use parlor_storage::queries::conversations;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn incoming(raw_address: &str, external_id: Option<&str>) -> IncomingMessage {
        IncomingMessage {
            tenant_id: "t-1".to_string(),
            channel: "sms".to_string(),
            raw_address: raw_address.to_string(),
            body: "is the flat still available?".to_string(),
            message_type: "SMS".to_string(),
            external_id: external_id.map(str::to_string),
            direction: Direction::Inbound,
            occurred_at: "2026-03-01T10:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn inbound_event_lands_on_canonical_contact() {
        let (db, _dir) = setup_db().await;

        let outcome = ingest_message(&db, &incoming("00357 99 123 456", Some("ev-1")))
            .await
            .unwrap();
        let message = match outcome {
            IngestOutcome::Ingested(m) => m,
            IngestOutcome::AlreadyIngested { .. } => panic!("first delivery must insert"),
        };
        assert_eq!(message.created_at, "2026-03-01T10:00:00.000Z");

        let contact = contacts::find_by_phone(&db, "t-1", "+35799123456")
            .await
            .unwrap()
            .expect("contact stored under canonical phone");
        let conversation = conversations::find_active_for_contact(&db, &contact.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 1);
        assert_eq!(conversation.status, "open");
        assert_eq!(conversation.last_message_body, "is the flat still available?");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn replayed_event_is_reported_not_duplicated() {
        let (db, _dir) = setup_db().await;
        let event = incoming("+35799123456", Some("ev-1"));

        let first = ingest_message(&db, &event).await.unwrap();
        let first_id = match first {
            IngestOutcome::Ingested(m) => m.id,
            IngestOutcome::AlreadyIngested { .. } => panic!("first delivery must insert"),
        };

        let replay = ingest_message(&db, &event).await.unwrap();
        match replay {
            IngestOutcome::AlreadyIngested { existing_id } => assert_eq!(existing_id, first_id),
            IngestOutcome::Ingested(_) => panic!("replay must not insert"),
        }

        let contact = contacts::find_by_phone(&db, "t-1", "+35799123456").await.unwrap().unwrap();
        let conversation = conversations::find_active_for_contact(&db, &contact.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn two_channels_converge_on_one_conversation() {
        let (db, _dir) = setup_db().await;

        ingest_message(&db, &incoming("00357 99 123 456", Some("sms-1"))).await.unwrap();
        let mut wa = incoming("+357-99-123456", Some("wa-1"));
        wa.channel = "whatsapp".to_string();
        wa.body = "following up from whatsapp".to_string();
        wa.occurred_at = "2026-03-01T11:00:00.000Z".to_string();
        ingest_message(&db, &wa).await.unwrap();

        let contact = contacts::find_by_phone(&db, "t-1", "+35799123456").await.unwrap().unwrap();
        let conversation = conversations::find_active_for_contact(&db, &contact.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 2);
        assert_eq!(conversation.last_message_body, "following up from whatsapp");
        assert_eq!(
            parlor_storage::queries::messages::count_for_conversation(&db, &conversation.id)
                .await
                .unwrap(),
            2
        );
        // Both channel addresses are recorded on the contact.
        assert!(contact.channel_id("sms").is_some());
        assert!(contact.channel_id("whatsapp").is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn alias_sender_gets_pending_resolution() {
        let (db, _dir) = setup_db().await;
        let mut event = incoming("204713986851234@lid", Some("wa-1"));
        event.channel = "whatsapp".to_string();

        ingest_message(&db, &event).await.unwrap();

        let due = aliases::due_pending(&db, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].alias, "204713986851234@lid");
        assert_eq!(due[0].channel, "whatsapp");

        // Replays do not create more resolution rows.
        let mut replay = event.clone();
        replay.external_id = Some("wa-2".to_string());
        ingest_message(&db, &replay).await.unwrap();
        assert_eq!(aliases::due_pending(&db, 10).await.unwrap().len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn far_future_event_is_stored_without_effects() {
        let (db, _dir) = setup_db().await;
        let mut event = incoming("+35799123456", Some("ev-1"));
        event.occurred_at = "2099-01-01T00:00:00.000Z".to_string();

        let outcome = ingest_message(&db, &event).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Ingested(_)));

        let contact = contacts::find_by_phone(&db, "t-1", "+35799123456").await.unwrap().unwrap();
        let conversation = conversations::find_active_for_contact(&db, &contact.id)
            .await
            .unwrap()
            .unwrap();
        // Message is on record but never steered the conversation.
        assert_eq!(conversation.unread_count, 0);
        assert_eq!(conversation.last_message_at, EPOCH_SENTINEL);
        assert_eq!(
            parlor_storage::queries::messages::count_for_conversation(&db, &conversation.id)
                .await
                .unwrap(),
            1
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn garbage_input_is_rejected_before_any_write() {
        let (db, _dir) = setup_db().await;

        let mut no_tenant = incoming("+35799123456", None);
        no_tenant.tenant_id = "  ".to_string();
        assert!(matches!(
            ingest_message(&db, &no_tenant).await,
            Err(ParlorError::Validation(_))
        ));

        let mut bad_time = incoming("+35799123456", None);
        bad_time.occurred_at = "yesterday-ish".to_string();
        assert!(matches!(
            ingest_message(&db, &bad_time).await,
            Err(ParlorError::Validation(_))
        ));

        let empty_address = incoming("   ", None);
        assert!(matches!(
            ingest_message(&db, &empty_address).await,
            Err(ParlorError::Validation(_))
        ));

        assert!(contacts::find_by_phone(&db, "t-1", "+35799123456").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn authored_reply_freezes_delivery_snapshot() {
        let (db, _dir) = setup_db().await;

        // Contact arrives through normal ingestion first.
        ingest_message(&db, &incoming("+35799123456", Some("ev-1"))).await.unwrap();
        let contact = contacts::find_by_phone(&db, "t-1", "+35799123456").await.unwrap().unwrap();
        contacts::merge_channel_id(&db, &contact.id, CRM_CHANNEL, "ghl-42").await.unwrap();

        let draft = OutboundDraft {
            tenant_id: "t-1".to_string(),
            contact_id: contact.id.clone(),
            body: "we can do a viewing on saturday".to_string(),
            message_type: "SMS".to_string(),
            credentials: CrmCredentials {
                api_key: "key-1".to_string(),
                location_id: "loc-1".to_string(),
            },
        };
        let authored = author_message(&db, &draft, 3).await.unwrap();
        assert_eq!(authored.message.direction, "outbound");
        assert_eq!(authored.message.channel, LOCAL_CHANNEL);

        let job = outbox::get_job(&db, authored.job_id).await.unwrap().unwrap();
        let payload = job.delivery_payload().unwrap();
        assert_eq!(payload.external_contact_id.as_deref(), Some("ghl-42"));
        assert_eq!(payload.contact_phone.as_deref(), Some("+35799123456"));
        assert_eq!(payload.body, "we can do a viewing on saturday");
        assert_eq!(payload.message_id, authored.message.id);

        // The reply landed in the same conversation and updated its summary.
        let conversation = conversations::find_active_for_contact(&db, &contact.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.last_message_body, "we can do a viewing on saturday");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn authoring_checks_contact_and_tenant() {
        let (db, _dir) = setup_db().await;
        ingest_message(&db, &incoming("+35799123456", Some("ev-1"))).await.unwrap();
        let contact = contacts::find_by_phone(&db, "t-1", "+35799123456").await.unwrap().unwrap();

        let missing = OutboundDraft {
            tenant_id: "t-1".to_string(),
            contact_id: "nope".to_string(),
            body: "hello".to_string(),
            message_type: "SMS".to_string(),
            credentials: CrmCredentials {
                api_key: "key-1".to_string(),
                location_id: "loc-1".to_string(),
            },
        };
        assert!(matches!(
            author_message(&db, &missing, 3).await,
            Err(ParlorError::Validation(_))
        ));

        let cross_tenant = OutboundDraft {
            tenant_id: "t-2".to_string(),
            contact_id: contact.id.clone(),
            body: "hello".to_string(),
            message_type: "SMS".to_string(),
            credentials: CrmCredentials {
                api_key: "key-1".to_string(),
                location_id: "loc-1".to_string(),
            },
        };
        assert!(matches!(
            author_message(&db, &cross_tenant, 3).await,
            Err(ParlorError::Validation(_))
        ));

        db.close().await.unwrap();
    }
}
