// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact CRUD and identity lookup operations.

use std::collections::BTreeMap;

use parlor_core::ParlorError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::models::Contact;

const CONTACT_COLUMNS: &str = "id, tenant_id, phone, email, channel_ids, created_at, updated_at";

fn contact_from_row(row: &rusqlite::Row<'_>) -> Result<Contact, rusqlite::Error> {
    Ok(Contact {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        channel_ids: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Lookup by canonical identity with the documented precedence: exact phone
/// match, then exact email match, then the channel's external id.
fn find_by_identity_inner(
    conn: &rusqlite::Connection,
    tenant_id: &str,
    phone: Option<&str>,
    email: Option<&str>,
    channel_key: Option<(&str, &str)>,
) -> Result<Option<Contact>, rusqlite::Error> {
    if let Some(phone) = phone {
        let found = conn
            .query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ?1 AND phone = ?2"),
                params![tenant_id, phone],
                contact_from_row,
            )
            .optional()?;
        if found.is_some() {
            return Ok(found);
        }
    }
    if let Some(email) = email {
        let found = conn
            .query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ?1 AND email = ?2"),
                params![tenant_id, email],
                contact_from_row,
            )
            .optional()?;
        if found.is_some() {
            return Ok(found);
        }
    }
    if let Some((channel, key)) = channel_key {
        let found = conn
            .query_row(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts
                     WHERE tenant_id = ?1 AND json_extract(channel_ids, '$.' || ?2) = ?3"
                ),
                params![tenant_id, channel, key],
                contact_from_row,
            )
            .optional()?;
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Find a contact by canonical identity.
///
/// `channel_key` is the `(channel, external id)` pair observed on this event;
/// it matches contacts whose only known identity is a channel-specific id
/// (e.g. an unresolved pseudo-identifier).
pub async fn find_by_identity(
    db: &Database,
    tenant_id: &str,
    phone: Option<String>,
    email: Option<String>,
    channel_key: Option<(String, String)>,
) -> Result<Option<Contact>, ParlorError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            Ok(find_by_identity_inner(
                conn,
                &tenant_id,
                phone.as_deref(),
                email.as_deref(),
                channel_key.as_ref().map(|(c, k)| (c.as_str(), k.as_str())),
            )?)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a new contact, tolerating a concurrent creator.
///
/// A unique violation on `(tenant_id, phone)` or `(tenant_id, email)` means
/// someone else just created the row; the failed insert is discarded and the
/// now-existing contact is read back and returned instead.
pub async fn insert_or_existing(db: &Database, contact: &Contact) -> Result<Contact, ParlorError> {
    let contact = contact.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO contacts (id, tenant_id, phone, email, channel_ids, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    contact.id,
                    contact.tenant_id,
                    contact.phone,
                    contact.email,
                    contact.channel_ids,
                    contact.created_at,
                    contact.updated_at,
                ],
            );
            match inserted {
                Ok(_) => Ok(contact),
                Err(e) if is_unique_violation(&e) => {
                    let existing = find_by_identity_inner(
                        conn,
                        &contact.tenant_id,
                        contact.phone.as_deref(),
                        contact.email.as_deref(),
                        None,
                    )?;
                    match existing {
                        Some(winner) => Ok(winner),
                        // The colliding row vanished between insert and
                        // re-read; surface the original violation.
                        None => Err(e.into()),
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a contact by id.
pub async fn get_contact(db: &Database, id: &str) -> Result<Option<Contact>, ParlorError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                    params![id],
                    contact_from_row,
                )
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find a contact by canonical phone only.
pub async fn find_by_phone(
    db: &Database,
    tenant_id: &str,
    phone: &str,
) -> Result<Option<Contact>, ParlorError> {
    let tenant_id = tenant_id.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            Ok(find_by_identity_inner(conn, &tenant_id, Some(&phone), None, None)?)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a newly observed `(channel, external id)` pair on a contact.
///
/// Returns `true` when the stored map actually changed.
pub async fn merge_channel_id(
    db: &Database,
    contact_id: &str,
    channel: &str,
    external_id: &str,
) -> Result<bool, ParlorError> {
    let contact_id = contact_id.to_string();
    let channel = channel.to_string();
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT channel_ids FROM contacts WHERE id = ?1",
                    params![contact_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(raw) = raw else {
                return Ok(false);
            };
            let mut map: BTreeMap<String, String> = if raw.is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?
            };
            if map.get(&channel).map(String::as_str) == Some(external_id.as_str()) {
                return Ok(false);
            }
            map.insert(channel, external_id);
            let updated = serde_json::to_string(&map)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            conn.execute(
                "UPDATE contacts SET channel_ids = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![updated, contact_id],
            )?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Write a resolved phone number onto a contact that has none yet.
///
/// Returns `false` without writing when the contact already has a phone or
/// another contact of the tenant owns the number (the caller then leaves the
/// alias mapping in place and lets the merge pass reconcile conversations).
pub async fn set_phone_if_free(
    db: &Database,
    contact_id: &str,
    phone: &str,
) -> Result<bool, ParlorError> {
    let contact_id = contact_id.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.execute(
                "UPDATE contacts SET phone = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND phone IS NULL",
                params![phone, contact_id],
            );
            match result {
                Ok(changed) => Ok(changed > 0),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
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

    fn make_contact(id: &str, tenant: &str, phone: Option<&str>, email: Option<&str>) -> Contact {
        Contact {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
            channel_ids: "{}".to_string(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_find_by_phone() {
        let (db, _dir) = setup_db().await;
        let contact = make_contact("c-1", "t-1", Some("+35799123456"), None);
        insert_or_existing(&db, &contact).await.unwrap();

        let found = find_by_identity(&db, "t-1", Some("+35799123456".into()), None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "c-1");

        // Identity is tenant-scoped.
        let other_tenant = find_by_identity(&db, "t-2", Some("+35799123456".into()), None, None)
            .await
            .unwrap();
        assert!(other_tenant.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn lookup_precedence_prefers_phone_over_email() {
        let (db, _dir) = setup_db().await;
        let by_phone = make_contact("c-phone", "t-1", Some("+35799111111"), None);
        let by_email = make_contact("c-email", "t-1", None, Some("buyer@example.com"));
        insert_or_existing(&db, &by_phone).await.unwrap();
        insert_or_existing(&db, &by_email).await.unwrap();

        let found = find_by_identity(
            &db,
            "t-1",
            Some("+35799111111".into()),
            Some("buyer@example.com".into()),
            None,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(found.id, "c-phone");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_phone_insert_returns_existing_row() {
        let (db, _dir) = setup_db().await;
        let first = make_contact("c-1", "t-1", Some("+35799123456"), None);
        insert_or_existing(&db, &first).await.unwrap();

        // A second creator racing on the same identity gets the winner back.
        let second = make_contact("c-2", "t-1", Some("+35799123456"), None);
        let resolved = insert_or_existing(&db, &second).await.unwrap();
        assert_eq!(resolved.id, "c-1");

        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                let n = conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_by_channel_external_id() {
        let (db, _dir) = setup_db().await;
        let mut contact = make_contact("c-1", "t-1", None, None);
        contact.channel_ids = r#"{"whatsapp":"204713986851234@lid"}"#.to_string();
        insert_or_existing(&db, &contact).await.unwrap();

        let found = find_by_identity(
            &db,
            "t-1",
            None,
            None,
            Some(("whatsapp".into(), "204713986851234@lid".into())),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(found.id, "c-1");

        let miss = find_by_identity(
            &db,
            "t-1",
            None,
            None,
            Some(("whatsapp".into(), "other@lid".into())),
        )
        .await
        .unwrap();
        assert!(miss.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn merge_channel_id_records_new_pairs_once() {
        let (db, _dir) = setup_db().await;
        let contact = make_contact("c-1", "t-1", Some("+35799123456"), None);
        insert_or_existing(&db, &contact).await.unwrap();

        assert!(merge_channel_id(&db, "c-1", "crm", "ghl-42").await.unwrap());
        // Re-observing the same pair is a no-op.
        assert!(!merge_channel_id(&db, "c-1", "crm", "ghl-42").await.unwrap());
        // A different channel extends the map.
        assert!(merge_channel_id(&db, "c-1", "whatsapp", "35799123456@s.whatsapp.net")
            .await
            .unwrap());

        let stored = get_contact(&db, "c-1").await.unwrap().unwrap();
        let map = stored.channel_id_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("crm").map(String::as_str), Some("ghl-42"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn set_phone_if_free_respects_uniqueness() {
        let (db, _dir) = setup_db().await;
        let owner = make_contact("c-owner", "t-1", Some("+35799123456"), None);
        let unresolved = make_contact("c-alias", "t-1", None, None);
        insert_or_existing(&db, &owner).await.unwrap();
        insert_or_existing(&db, &unresolved).await.unwrap();

        // Number already owned by another contact: left unchanged.
        assert!(!set_phone_if_free(&db, "c-alias", "+35799123456").await.unwrap());
        // A free number lands.
        assert!(set_phone_if_free(&db, "c-alias", "+35799999999").await.unwrap());
        // Contact now has a phone: further writes are rejected.
        assert!(!set_phone_if_free(&db, "c-alias", "+35798888888").await.unwrap());

        db.close().await.unwrap();
    }
}
