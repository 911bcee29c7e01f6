//! Notification ledger queries.
//!
//! The ledger is append-only; rows exist to compute quota windows.

use warden_core::db::unix_timestamp;

use super::db::{DatabaseError, WardenDatabase};
use super::models::SentNotification;

impl WardenDatabase {
    // =========================================================================
    // Sent notification queries
    // =========================================================================

    pub async fn insert_sent_notification(
        &self,
        id: i64,
        sender_address: &str,
        receiver_address: &str,
        template_name: &str,
    ) -> Result<SentNotification, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO sent_notifications (id, sender_address, receiver_address, template_name, \
             created_at, last_modified_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(sender_address)
        .bind(receiver_address)
        .bind(template_name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(SentNotification {
            id,
            sender_address: sender_address.to_string(),
            receiver_address: receiver_address.to_string(),
            template_name: template_name.to_string(),
            created_at: now,
            last_modified_at: now,
        })
    }

    /// Count rows for `(template, receiver)` created strictly after `since`.
    pub async fn count_sent_notifications_since(
        &self,
        template_name: &str,
        receiver_address: &str,
        since: i64,
    ) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sent_notifications \
             WHERE template_name = ? AND receiver_address = ? AND created_at > ?",
        )
        .bind(template_name)
        .bind(receiver_address)
        .bind(since)
        .fetch_one(self.pool())
        .await?;

        Ok(count)
    }

    /// Rewrite the addressing of a ledger row. Not used by the quota logic.
    pub async fn modify_sent_notification(
        &self,
        id: i64,
        sender_address: &str,
        receiver_address: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE sent_notifications SET sender_address = ?, receiver_address = ?, \
             last_modified_at = ? WHERE id = ?",
        )
        .bind(sender_address)
        .bind(receiver_address)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Sent notification {id}")));
        }
        Ok(())
    }
}
