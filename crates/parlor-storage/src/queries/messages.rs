// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence. Ingestion is a single transaction covering the
//! dedup check, the insert, and the conversation side effects.

use parlor_core::ParlorError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::models::{Message, SummaryPatch};

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, tenant_id, direction, body, message_type, channel, external_id, created_at";

fn message_from_row(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        tenant_id: row.get(2)?,
        direction: row.get(3)?,
        body: row.get(4)?,
        message_type: row.get(5)?,
        channel: row.get(6)?,
        external_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Outcome of [`insert_ingested`].
#[derive(Debug, Clone)]
pub enum StoredMessage {
    Inserted(Message),
    /// A message with the same `(channel, external_id)` already exists.
    Duplicate { existing_id: String },
}

fn find_by_external_id(
    conn: &rusqlite::Connection,
    channel: &str,
    external_id: &str,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT id FROM messages WHERE channel = ?1 AND external_id = ?2",
        params![channel, external_id],
        |row| row.get(0),
    )
    .optional()
}

/// Look up a previously ingested event by its channel coordinates.
pub async fn find_ingested_id(
    db: &Database,
    channel: &str,
    external_id: &str,
) -> Result<Option<String>, ParlorError> {
    let channel = channel.to_string();
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| Ok(find_by_external_id(conn, &channel, &external_id)?))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Store a message and apply its conversation side effects atomically.
///
/// With `summary` present: the summary advances (and the conversation
/// reopens) when the patch is newer than the stored row, and inbound
/// messages bump `unread_count` and reopen regardless of summary age.
/// With `summary` absent the message is stored bare; callers pass `None`
/// when the event's timestamp failed sanity checks and must not steer
/// conversation state.
///
/// When `(channel, external_id)` is already on record nothing is written
/// and the existing id is reported, so webhook redeliveries are absorbed
/// without double counting.
pub async fn insert_ingested(
    db: &Database,
    message: &Message,
    summary: Option<&SummaryPatch>,
) -> Result<StoredMessage, ParlorError> {
    let message = message.clone();
    let summary = summary.cloned();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            if let Some(external_id) = &message.external_id {
                if let Some(existing_id) = find_by_external_id(&tx, &message.channel, external_id)? {
                    return Ok(StoredMessage::Duplicate { existing_id });
                }
            }

            let inserted = tx.execute(
                "INSERT INTO messages
                 (id, conversation_id, tenant_id, direction, body, message_type, channel,
                  external_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    message.id,
                    message.conversation_id,
                    message.tenant_id,
                    message.direction,
                    message.body,
                    message.message_type,
                    message.channel,
                    message.external_id,
                    message.created_at,
                ],
            );
            if let Err(e) = inserted {
                // A concurrent delivery of the same event can slip in between
                // the check and the insert.
                let raced = matches!(
                    &e,
                    rusqlite::Error::SqliteFailure(f, _)
                        if f.code == rusqlite::ErrorCode::ConstraintViolation
                );
                if raced {
                    if let Some(external_id) = &message.external_id {
                        if let Some(existing_id) =
                            find_by_external_id(&tx, &message.channel, external_id)?
                        {
                            return Ok(StoredMessage::Duplicate { existing_id });
                        }
                    }
                }
                return Err(e.into());
            }

            if let Some(patch) = &summary {
                // RFC 3339 strings order as text, so the predicate also
                // catches the epoch sentinel on fresh conversations.
                tx.execute(
                    "UPDATE conversations
                     SET last_message_at = ?1, last_message_body = ?2, last_message_type = ?3,
                         status = 'open',
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?4 AND last_message_at < ?1",
                    params![
                        patch.last_message_at,
                        patch.last_message_body,
                        patch.last_message_type,
                        message.conversation_id,
                    ],
                )?;

                if message.direction == "inbound" {
                    tx.execute(
                        "UPDATE conversations
                         SET unread_count = unread_count + 1, status = 'open',
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![message.conversation_id],
                    )?;
                }
            }

            tx.commit()?;
            Ok(StoredMessage::Inserted(message))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, ParlorError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                    params![id],
                    message_from_row,
                )
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn count_for_conversation(
    db: &Database,
    conversation_id: &str,
) -> Result<i64, ParlorError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
