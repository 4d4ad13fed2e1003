use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bazaar_scheduler::collab::BackupRunner;
use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::error::{CatalogError, Result};

/// Writes consistent snapshots of the database with `VACUUM INTO`.
pub struct SqliteBackup {
    conn: Arc<Mutex<Connection>>,
    dir: PathBuf,
}

impl SqliteBackup {
    pub fn new(conn: Connection, dir: impl Into<PathBuf>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bazaar-<timestamp>.db` into the backup directory and return its
    /// path. Runs on the blocking pool; a large database takes a while.
    pub async fn snapshot(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("bazaar-{}.db", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        let conn = Arc::clone(&self.conn);
        let target = path.to_string_lossy().into_owned();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn
                .lock()
                .map_err(|_| CatalogError::LockPoisoned("backup"))?;
            conn.execute("VACUUM INTO ?1", [target])?;
            Ok(())
        })
        .await
        .map_err(|e| CatalogError::Backup(e.to_string()))??;

        info!(path = %path.display(), "database snapshot written");
        Ok(path)
    }
}

#[async_trait]
impl BackupRunner for SqliteBackup {
    async fn run_database_backup(&self) -> bazaar_scheduler::Result<()> {
        self.snapshot().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_contains_the_source_rows() {
        let dir = std::env::temp_dir().join(format!("bazaar-backup-{}", uuid::Uuid::new_v4()));
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1), (2), (3);",
        )
        .unwrap();

        let backup = SqliteBackup::new(conn, &dir);
        let path = backup.snapshot().await.unwrap();
        assert!(path.starts_with(&dir));

        let copy = Connection::open(&path).unwrap();
        let n: i64 = copy.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
