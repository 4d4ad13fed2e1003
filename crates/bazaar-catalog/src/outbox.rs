use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bazaar_scheduler::collab::Notifier;
use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::db::{init_db, ts};
use crate::error::{CatalogError, Result};
use crate::types::OutboxMessage;

/// Queues notifications in `notification_outbox` for the mail relay.
///
/// Enqueueing is the whole contract from the scheduler's side; delivery and
/// templating happen elsewhere.
pub struct OutboxNotifier {
    db: Mutex<Connection>,
}

impl OutboxNotifier {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| CatalogError::LockPoisoned("outbox"))
    }

    #[instrument(skip(self, body))]
    pub fn enqueue(&self, recipient: &str, subject: &str, body: &str) -> Result<i64> {
        let db = self.db()?;
        db.execute(
            "INSERT INTO notification_outbox (recipient, subject, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![recipient, subject, body, ts(Utc::now())],
        )?;
        let id = db.last_insert_rowid();
        debug!(id, "notification queued");
        Ok(id)
    }

    /// Unsent messages, oldest first. The mail relay polls this; `bazaard
    /// outbox` prints it.
    pub fn pending(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let db = self.db()?;
        let mut stmt = db.prepare(
            "SELECT id, recipient, subject, body, created_at FROM notification_outbox
             WHERE sent_at IS NULL
             ORDER BY id
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(OutboxMessage {
                    id: row.get(0)?,
                    recipient: row.get(1)?,
                    subject: row.get(2)?,
                    body: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Called by the mail relay after delivery. Returns `false` for an
    /// unknown or already-sent id.
    pub fn mark_sent(&self, id: i64) -> Result<bool> {
        let db = self.db()?;
        let n = db.execute(
            "UPDATE notification_outbox SET sent_at = ?1 WHERE id = ?2 AND sent_at IS NULL",
            rusqlite::params![ts(Utc::now()), id],
        )?;
        Ok(n > 0)
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send_notification_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> bazaar_scheduler::Result<()> {
        self.enqueue(to, subject, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_messages_stay_pending_until_sent() {
        let outbox = OutboxNotifier::new(Connection::open_in_memory().unwrap()).unwrap();
        outbox
            .send_notification_email("a@example.com", "Expiring", "soon")
            .await
            .unwrap();
        let id = outbox.enqueue("b@example.com", "Expiring", "soon").unwrap();

        let pending = outbox.pending(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].recipient, "a@example.com");

        assert!(outbox.mark_sent(id).unwrap());
        assert!(!outbox.mark_sent(id).unwrap());
        assert_eq!(outbox.pending(10).unwrap().len(), 1);
    }
}
