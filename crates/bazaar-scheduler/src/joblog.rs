use std::sync::{Mutex, MutexGuard};

use bazaar_core::types::parse_timestamp;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    types::{JobKind, JobRecord},
};

const SELECT_COLUMNS: &str =
    "SELECT id, name, collection_name, referenced_entity_id, target_at, created_at
     FROM scheduled_jobs";

/// Durable job log: the single source of truth recovery rebuilds timers from.
///
/// Wraps its own SQLite `Connection` in a `Mutex`; every call is a short,
/// synchronous statement so callers may use it from async callbacks.
pub struct JobLog {
    conn: Mutex<Connection>,
}

impl JobLog {
    /// Wrap `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SchedulerError::LockPoisoned("job log"))
    }

    /// Persist a pending job, or return the existing row for the same
    /// (kind, entity) pair with its `target_at` refreshed.
    ///
    /// The row id of an existing job never changes, so a timer armed from it
    /// keeps deleting the right row.
    #[instrument(skip(self), fields(kind = %kind))]
    pub fn record(
        &self,
        kind: JobKind,
        collection_name: &str,
        entity_id: &str,
        target_at: DateTime<Utc>,
    ) -> Result<JobRecord> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO scheduled_jobs
             (id, name, collection_name, referenced_entity_id, target_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(name, referenced_entity_id)
             DO UPDATE SET target_at = excluded.target_at",
            rusqlite::params![
                id,
                kind.as_str(),
                collection_name,
                entity_id,
                target_at.to_rfc3339(),
                now
            ],
        )?;

        let record = conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE name = ?1 AND referenced_entity_id = ?2"),
            rusqlite::params![kind.as_str(), entity_id],
            row_to_record,
        )?;
        debug!(job_id = %record.id, entity_id, "job recorded");
        Ok(record)
    }

    /// Fetch a job by id, `None` if it was already removed.
    pub fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                [id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Fetch the pending job of `kind` for `entity_id`, if any.
    pub fn find(&self, kind: JobKind, entity_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE name = ?1 AND referenced_entity_id = ?2"),
                rusqlite::params![kind.as_str(), entity_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Return every pending job in insertion order.
    pub fn list(&self) -> Result<Vec<JobRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at, rowid"))?;
        let jobs = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Delete a job by id. Returns `false` when no row matched.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM scheduled_jobs WHERE id = ?1", [id])?;
        if n > 0 {
            info!(job_id = %id, "job removed");
        }
        Ok(n > 0)
    }

    /// Delete the job of `kind` for `entity_id`. Returns `false` when absent.
    pub fn remove_for(&self, kind: JobKind, entity_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM scheduled_jobs WHERE name = ?1 AND referenced_entity_id = ?2",
            rusqlite::params![kind.as_str(), entity_id],
        )?;
        if n > 0 {
            info!(%kind, entity_id, "job removed");
        }
        Ok(n > 0)
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM scheduled_jobs", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Last persisted upper bound of the named sweep, if any.
    pub fn watermark(&self, sweep: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT watermark FROM sweep_watermarks WHERE name = ?1",
                [sweep],
                |r| r.get(0),
            )
            .optional()?;
        match raw {
            Some(s) => Ok(Some(parse_timestamp(&s)?)),
            None => Ok(None),
        }
    }

    pub fn set_watermark(&self, sweep: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sweep_watermarks (name, watermark, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                watermark = excluded.watermark,
                updated_at = excluded.updated_at",
            rusqlite::params![sweep, at.to_rfc3339(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let target_at: Option<String> = row.get(4)?;
    Ok(JobRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        collection_name: row.get(2)?,
        referenced_entity_id: row.get(3)?,
        // An unparsable target is tolerated; recovery re-reads the offer anyway.
        target_at: target_at.and_then(|s| parse_timestamp(&s).ok()),
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::types::PROMO_OFFER_COLLECTION;

    fn log() -> JobLog {
        JobLog::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn record_is_unique_per_kind_and_entity() {
        let log = log();
        let t1 = Utc::now();
        let first = log
            .record(JobKind::OfferStart, PROMO_OFFER_COLLECTION, "o-1", t1)
            .unwrap();
        let second = log
            .record(
                JobKind::OfferStart,
                PROMO_OFFER_COLLECTION,
                "o-1",
                t1 + Duration::hours(1),
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(log.len().unwrap(), 1);
        assert_eq!(
            second.target_at.unwrap().timestamp(),
            (t1 + Duration::hours(1)).timestamp()
        );

        log.record(JobKind::OfferEnd, PROMO_OFFER_COLLECTION, "o-1", t1)
            .unwrap();
        assert_eq!(log.len().unwrap(), 2);
    }

    #[test]
    fn remove_reports_whether_a_row_matched() {
        let log = log();
        let job = log
            .record(JobKind::OfferEnd, PROMO_OFFER_COLLECTION, "o-2", Utc::now())
            .unwrap();
        assert!(log.remove(&job.id).unwrap());
        assert!(!log.remove(&job.id).unwrap());
        assert!(log.get(&job.id).unwrap().is_none());
        assert!(!log.remove_for(JobKind::OfferEnd, "o-2").unwrap());
    }

    #[test]
    fn list_preserves_insertion_order() {
        let log = log();
        for id in ["a", "b", "c"] {
            log.record(JobKind::OfferStart, PROMO_OFFER_COLLECTION, id, Utc::now())
                .unwrap();
        }
        let ids: Vec<_> = log
            .list()
            .unwrap()
            .into_iter()
            .map(|j| j.referenced_entity_id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn watermark_upserts() {
        let log = log();
        assert!(log.watermark("sweep").unwrap().is_none());
        let at = Utc::now();
        log.set_watermark("sweep", at).unwrap();
        log.set_watermark("sweep", at + Duration::days(1)).unwrap();
        assert_eq!(
            log.watermark("sweep").unwrap().unwrap().timestamp(),
            (at + Duration::days(1)).timestamp()
        );
    }
}
