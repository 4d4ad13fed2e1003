use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `scheduled_jobs` job log and the `sweep_watermarks` table
/// (idempotent). The unique index keeps at most one pending job per
/// (job name, entity) pair.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scheduled_jobs (
            id                    TEXT NOT NULL PRIMARY KEY,
            name                  TEXT NOT NULL,   -- offer-start | offer-end
            collection_name       TEXT NOT NULL,
            referenced_entity_id  TEXT NOT NULL,
            target_at             TEXT,            -- ISO-8601 or NULL
            created_at            TEXT NOT NULL,
            UNIQUE(name, referenced_entity_id)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS sweep_watermarks (
            name        TEXT NOT NULL PRIMARY KEY,
            watermark   TEXT NOT NULL,             -- ISO-8601
            updated_at  TEXT NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM scheduled_jobs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }
}
