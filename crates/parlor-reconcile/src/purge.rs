// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention purge for trashed conversations.

use parlor_core::ParlorError;
use parlor_storage::queries::conversations;
use parlor_storage::Database;
use tracing::info;

/// Outcome of one [`purge_trash`] run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeReport {
    pub conversations: usize,
    pub messages: usize,
}

/// Permanently delete conversations trashed longer than `retention_days`
/// ago, together with their messages. Recently trashed conversations stay
/// recoverable.
pub async fn purge_trash(db: &Database, retention_days: u32) -> Result<PurgeReport, ParlorError> {
    let cutoff = parlor_core::time::format(
        parlor_core::time::now() - chrono::Duration::days(i64::from(retention_days)),
    );
    let (conversations, messages) = conversations::purge_trashed(db, &cutoff).await?;
    info!(conversations, messages, cutoff = %cutoff, "retention purge finished");
    Ok(PurgeReport { conversations, messages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::{Direction, IncomingMessage};
    use parlor_storage::queries::contacts;
    use tempfile::tempdir;

    use crate::ingest::ingest_message;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    async fn trashed_conversation(db: &Database, phone: &str, trashed_at: &str) -> String {
        ingest_message(
            db,
            &IncomingMessage {
                tenant_id: "t-1".to_string(),
                channel: "sms".to_string(),
                raw_address: phone.to_string(),
                body: "old thread".to_string(),
                message_type: "SMS".to_string(),
                external_id: Some(format!("ev-{phone}")),
                direction: Direction::Inbound,
                occurred_at: "2026-01-01T10:00:00.000Z".to_string(),
            },
        )
        .await
        .unwrap();
        let contact = contacts::find_by_phone(db, "t-1", phone).await.unwrap().unwrap();
        let conversation = conversations::find_active_for_contact(db, &contact.id)
            .await
            .unwrap()
            .unwrap();
        conversations::trash_conversation(db, &conversation.id).await.unwrap();
        let id = conversation.id.clone();
        {
            let id = id.clone();
            let trashed_at = trashed_at.to_string();
            db.connection()
                .call(move |conn| -> Result<(), rusqlite::Error> {
                    conn.execute(
                        "UPDATE conversations SET trashed_at = ?1 WHERE id = ?2",
                        rusqlite::params![trashed_at, id],
                    )?;
                    Ok(())
                })
                .await
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn purge_honors_retention_window() {
        let (db, _dir) = setup_db().await;

        let expired = trashed_conversation(&db, "+35799111111", "2026-01-05T00:00:00.000Z").await;
        let recent = {
            let just_now = parlor_core::time::format(parlor_core::time::now());
            trashed_conversation(&db, "+35799222222", &just_now).await
        };

        let report = purge_trash(&db, 30).await.unwrap();
        assert_eq!(report.conversations, 1);
        assert_eq!(report.messages, 1);

        assert!(conversations::get_conversation(&db, &expired).await.unwrap().is_none());
        assert!(conversations::get_conversation(&db, &recent).await.unwrap().is_some());

        db.close().await.unwrap();
    }
}
