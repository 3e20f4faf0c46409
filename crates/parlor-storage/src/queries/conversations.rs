// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle: creation, duplicate merge, summary audit,
//! trash and purge.

use parlor_core::ParlorError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::models::{Conversation, SummaryPatch};

const CONVERSATION_COLUMNS: &str = "id, contact_id, tenant_id, status, trashed_at, unread_count, \
     last_message_at, last_message_body, last_message_type, created_at, updated_at";

fn conversation_from_row(row: &rusqlite::Row<'_>) -> Result<Conversation, rusqlite::Error> {
    Ok(Conversation {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        tenant_id: row.get(2)?,
        status: row.get(3)?,
        trashed_at: row.get(4)?,
        unread_count: row.get(5)?,
        last_message_at: row.get(6)?,
        last_message_body: row.get(7)?,
        last_message_type: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// One conversation row paired with the latest message actually on record,
/// as reported by [`summary_audit`].
#[derive(Debug, Clone)]
pub struct SummaryAuditRow {
    pub conversation_id: String,
    pub tenant_id: String,
    pub stored: SummaryPatch,
    pub latest: Option<SummaryPatch>,
}

pub async fn insert_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), ParlorError> {
    let conversation = conversation.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations
                 (id, contact_id, tenant_id, status, trashed_at, unread_count,
                  last_message_at, last_message_body, last_message_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    conversation.id,
                    conversation.contact_id,
                    conversation.tenant_id,
                    conversation.status,
                    conversation.trashed_at,
                    conversation.unread_count,
                    conversation.last_message_at,
                    conversation.last_message_body,
                    conversation.last_message_type,
                    conversation.created_at,
                    conversation.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_conversation(
    db: &Database,
    id: &str,
) -> Result<Option<Conversation>, ParlorError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                    params![id],
                    conversation_from_row,
                )
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The conversation new messages should land in: the oldest non-trashed one.
///
/// Picking the oldest keeps ingestion aligned with the merge pass, which
/// also survives the earliest conversation on a tie.
pub async fn find_active_for_contact(
    db: &Database,
    contact_id: &str,
) -> Result<Option<Conversation>, ParlorError> {
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {CONVERSATION_COLUMNS} FROM conversations
                         WHERE contact_id = ?1 AND trashed_at IS NULL
                         ORDER BY created_at ASC, id ASC
                         LIMIT 1"
                    ),
                    params![contact_id],
                    conversation_from_row,
                )
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Contacts that currently own more than one live conversation.
pub async fn contacts_with_duplicates(db: &Database) -> Result<Vec<String>, ParlorError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT contact_id FROM conversations
                 WHERE trashed_at IS NULL
                 GROUP BY contact_id
                 HAVING COUNT(*) > 1
                 ORDER BY contact_id",
            )?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

struct MergeCandidate {
    id: String,
    unread_count: i64,
    last_message_at: String,
    last_message_body: String,
    last_message_type: String,
}

/// Collapse all live conversations of a contact into one.
///
/// The survivor is the conversation with the most messages; ties go to the
/// earliest-created row. Messages are reparented, unread counts summed, and
/// the newest summary of the group wins. Runs in a single transaction so a
/// crash never leaves a half-merged contact.
///
/// Returns the number of duplicate conversations removed.
pub async fn merge_for_contact(db: &Database, contact_id: &str) -> Result<usize, ParlorError> {
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let candidates = {
                let mut stmt = tx.prepare(
                    "SELECT c.id, c.unread_count, c.last_message_at, c.last_message_body,
                            c.last_message_type,
                            (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
                              AS message_count
                     FROM conversations c
                     WHERE c.contact_id = ?1 AND c.trashed_at IS NULL
                     ORDER BY message_count DESC, c.created_at ASC, c.id ASC",
                )?;
                stmt.query_map(params![contact_id], |row| {
                    Ok(MergeCandidate {
                        id: row.get(0)?,
                        unread_count: row.get(1)?,
                        last_message_at: row.get(2)?,
                        last_message_body: row.get(3)?,
                        last_message_type: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?
            };

            if candidates.len() < 2 {
                return Ok(0);
            }

            let mut iter = candidates.into_iter();
            let master = match iter.next() {
                Some(m) => m,
                None => return Ok(0),
            };
            let duplicates: Vec<MergeCandidate> = iter.collect();

            let mut extra_unread = 0i64;
            let mut newest = SummaryPatch {
                last_message_at: master.last_message_at.clone(),
                last_message_body: master.last_message_body.clone(),
                last_message_type: master.last_message_type.clone(),
            };
            for dup in &duplicates {
                tx.execute(
                    "UPDATE messages SET conversation_id = ?1 WHERE conversation_id = ?2",
                    params![master.id, dup.id],
                )?;
                extra_unread += dup.unread_count;
                // RFC 3339 UTC strings order chronologically as text.
                if dup.last_message_at > newest.last_message_at {
                    newest = SummaryPatch {
                        last_message_at: dup.last_message_at.clone(),
                        last_message_body: dup.last_message_body.clone(),
                        last_message_type: dup.last_message_type.clone(),
                    };
                }
            }

            tx.execute(
                "UPDATE conversations
                 SET unread_count = unread_count + ?1,
                     last_message_at = ?2,
                     last_message_body = ?3,
                     last_message_type = ?4,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?5",
                params![
                    extra_unread,
                    newest.last_message_at,
                    newest.last_message_body,
                    newest.last_message_type,
                    master.id,
                ],
            )?;
            for dup in &duplicates {
                tx.execute("DELETE FROM conversations WHERE id = ?1", params![dup.id])?;
            }

            let removed = duplicates.len();
            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Overwrite the denormalized summary of a conversation.
pub async fn set_summary(
    db: &Database,
    conversation_id: &str,
    patch: &SummaryPatch,
) -> Result<(), ParlorError> {
    let conversation_id = conversation_id.to_string();
    let patch = patch.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations
                 SET last_message_at = ?1, last_message_body = ?2, last_message_type = ?3,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?4",
                params![
                    patch.last_message_at,
                    patch.last_message_body,
                    patch.last_message_type,
                    conversation_id,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Every live conversation with its stored summary and the latest message
/// actually present. `latest` is `None` for conversations with no messages.
pub async fn summary_audit(db: &Database) -> Result<Vec<SummaryAuditRow>, ParlorError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.tenant_id, c.last_message_at, c.last_message_body,
                        c.last_message_type, m.created_at, m.body, m.message_type
                 FROM conversations c
                 LEFT JOIN messages m ON m.id = (
                     SELECT m2.id FROM messages m2
                     WHERE m2.conversation_id = c.id
                     ORDER BY m2.created_at DESC, m2.id DESC
                     LIMIT 1)
                 WHERE c.trashed_at IS NULL
                 ORDER BY c.id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let latest_at: Option<String> = row.get(5)?;
                    let latest = match latest_at {
                        Some(last_message_at) => Some(SummaryPatch {
                            last_message_at,
                            last_message_body: row.get(6)?,
                            last_message_type: row.get(7)?,
                        }),
                        None => None,
                    };
                    Ok(SummaryAuditRow {
                        conversation_id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        stored: SummaryPatch {
                            last_message_at: row.get(2)?,
                            last_message_body: row.get(3)?,
                            last_message_type: row.get(4)?,
                        },
                        latest,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move a conversation to the trash. Returns `false` when it was already
/// trashed or does not exist.
pub async fn trash_conversation(db: &Database, id: &str) -> Result<bool, ParlorError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET trashed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND trashed_at IS NULL",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Permanently delete conversations trashed at or before `cutoff`, together
/// with their messages. Returns `(conversations, messages)` deleted.
pub async fn purge_trashed(db: &Database, cutoff: &str) -> Result<(usize, usize), ParlorError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let messages = tx.execute(
                "DELETE FROM messages WHERE conversation_id IN (
                     SELECT id FROM conversations
                     WHERE trashed_at IS NOT NULL AND trashed_at <= ?1)",
                params![cutoff],
            )?;
            let conversations = tx.execute(
                "DELETE FROM conversations WHERE trashed_at IS NOT NULL AND trashed_at <= ?1",
                params![cutoff],
            )?;
            tx.commit()?;
            Ok((conversations, messages))
        })
        .await
        .map_err(crate::database::map_tr_err)
}
