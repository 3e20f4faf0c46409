// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Find-or-create resolution of contacts and conversations.
//!
//! This is the online ingestion path and takes no locks: concurrent
//! creators for the same identity are reconciled through the storage
//! layer's uniqueness constraints.

use std::collections::BTreeMap;

use parlor_core::types::channel_ids_to_json;
use parlor_core::{CanonicalIdentity, Contact, Conversation, ParlorError, EPOCH_SENTINEL};
use parlor_storage::queries::{contacts, conversations};
use parlor_storage::Database;
use tracing::debug;
use uuid::Uuid;

/// The canonical string a channel knows this identity by.
fn channel_key(identity: &CanonicalIdentity) -> Option<&str> {
    identity
        .alias
        .as_deref()
        .or(identity.phone.as_deref())
        .or(identity.email.as_deref())
}

/// Find the tenant's contact for a canonical identity, creating one when
/// nothing matches.
///
/// Losing a creation race is handled by adopting the row the other caller
/// created. Either way, the `(channel, key)` observation is recorded on the
/// surviving contact so later lookups can match on it.
pub async fn resolve_contact(
    db: &Database,
    tenant_id: &str,
    identity: &CanonicalIdentity,
    channel: &str,
) -> Result<Contact, ParlorError> {
    let key = channel_key(identity)
        .ok_or_else(|| ParlorError::Validation("identity carries no matching key".into()))?
        .to_string();
    let alias_pair = identity
        .alias
        .as_ref()
        .map(|alias| (channel.to_string(), alias.clone()));

    if let Some(existing) = contacts::find_by_identity(
        db,
        tenant_id,
        identity.phone.clone(),
        identity.email.clone(),
        alias_pair,
    )
    .await?
    {
        if contacts::merge_channel_id(db, &existing.id, channel, &key).await? {
            debug!(contact_id = %existing.id, channel, "recorded new channel id");
        }
        return Ok(existing);
    }

    let now = parlor_core::time::format(parlor_core::time::now());
    let mut channel_ids = BTreeMap::new();
    channel_ids.insert(channel.to_string(), key.clone());
    let fresh = Contact {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        phone: identity.phone.clone(),
        email: identity.email.clone(),
        channel_ids: channel_ids_to_json(&channel_ids)?,
        created_at: now.clone(),
        updated_at: now,
    };

    let winner = contacts::insert_or_existing(db, &fresh).await?;
    if winner.id != fresh.id {
        debug!(contact_id = %winner.id, "lost contact creation race, adopting existing row");
        contacts::merge_channel_id(db, &winner.id, channel, &key).await?;
    }
    Ok(winner)
}

/// The conversation new messages for this contact land in. Creates an open
/// conversation when the contact has none live.
///
/// Two racing creators can both insert here; there is no uniqueness rail.
/// The merge pass collapses the duplicates afterwards.
pub async fn resolve_conversation(
    db: &Database,
    contact: &Contact,
) -> Result<Conversation, ParlorError> {
    if let Some(active) = conversations::find_active_for_contact(db, &contact.id).await? {
        return Ok(active);
    }

    let now = parlor_core::time::format(parlor_core::time::now());
    let fresh = Conversation {
        id: Uuid::new_v4().to_string(),
        contact_id: contact.id.clone(),
        tenant_id: contact.tenant_id.clone(),
        status: "open".to_string(),
        trashed_at: None,
        unread_count: 0,
        last_message_at: EPOCH_SENTINEL.to_string(),
        last_message_body: String::new(),
        last_message_type: String::new(),
        created_at: now.clone(),
        updated_at: now,
    };
    conversations::insert_conversation(db, &fresh).await?;
    debug!(conversation_id = %fresh.id, contact_id = %contact.id, "opened conversation");
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn phone_identity_creates_then_reuses_contact() {
        let (db, _dir) = setup_db().await;
        let identity = CanonicalIdentity::from_phone("+35799123456");

        let first = resolve_contact(&db, "t-1", &identity, "sms").await.unwrap();
        assert_eq!(first.phone.as_deref(), Some("+35799123456"));
        assert_eq!(first.channel_id("sms").as_deref(), Some("+35799123456"));

        let second = resolve_contact(&db, "t-1", &identity, "whatsapp").await.unwrap();
        assert_eq!(second.id, first.id);
        // The new channel observation landed on the same contact.
        let stored = contacts::get_contact(&db, &first.id).await.unwrap().unwrap();
        assert_eq!(stored.channel_id("whatsapp").as_deref(), Some("+35799123456"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn alias_identity_creates_contact_without_phone() {
        let (db, _dir) = setup_db().await;
        let identity = CanonicalIdentity::from_alias("204713986851234@lid");

        let contact = resolve_contact(&db, "t-1", &identity, "whatsapp").await.unwrap();
        assert!(contact.phone.is_none());
        assert!(contact.email.is_none());
        assert_eq!(
            contact.channel_id("whatsapp").as_deref(),
            Some("204713986851234@lid")
        );

        // Same alias resolves to the same contact.
        let again = resolve_contact(&db, "t-1", &identity, "whatsapp").await.unwrap();
        assert_eq!(again.id, contact.id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn tenants_do_not_share_contacts() {
        let (db, _dir) = setup_db().await;
        let identity = CanonicalIdentity::from_email("buyer@example.com");

        let a = resolve_contact(&db, "t-1", &identity, "mail").await.unwrap();
        let b = resolve_contact(&db, "t-2", &identity, "mail").await.unwrap();
        assert_ne!(a.id, b.id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn conversation_is_reused_until_trashed() {
        let (db, _dir) = setup_db().await;
        let identity = CanonicalIdentity::from_phone("+35799123456");
        let contact = resolve_contact(&db, "t-1", &identity, "sms").await.unwrap();

        let first = resolve_conversation(&db, &contact).await.unwrap();
        assert_eq!(first.status, "open");
        assert_eq!(first.last_message_at, EPOCH_SENTINEL);

        let second = resolve_conversation(&db, &contact).await.unwrap();
        assert_eq!(second.id, first.id);

        conversations::trash_conversation(&db, &first.id).await.unwrap();
        let third = resolve_conversation(&db, &contact).await.unwrap();
        assert_ne!(third.id, first.id);

        db.close().await.unwrap();
    }
}
