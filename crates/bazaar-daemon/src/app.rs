use std::sync::Arc;

use anyhow::Context;
use bazaar_catalog::{CatalogStore, OutboxNotifier, SqliteBackup};
use bazaar_core::BazaarConfig;
use bazaar_scheduler::{
    BackupSweep, ExpirySettings, ExpirySweep, JobLog, OfferTriggers, RecoveryCoordinator, Scheduler,
};
use rusqlite::Connection;
use tracing::info;

/// Every long-lived component of the daemon, wired over one SQLite file.
pub struct Services {
    pub config: BazaarConfig,
    pub scheduler: Scheduler,
    pub log: Arc<JobLog>,
    pub triggers: OfferTriggers,
    pub backup: Arc<BackupSweep>,
    pub expiry: Arc<ExpirySweep>,
    pub outbox: Arc<OutboxNotifier>,
}

impl Services {
    /// Open the database, run schema migrations and build all components.
    /// Each component gets its own connection.
    pub fn open(config: BazaarConfig) -> anyhow::Result<Self> {
        let db_path = config.database.path.clone();
        ensure_parent_dir(&db_path)?;
        info!(path = %db_path, "opening SQLite database");

        let db = open_connection(&db_path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        bazaar_scheduler::db::init_db(&db)?;
        bazaar_catalog::db::init_db(&db)?;
        info!("database migrations complete");

        let scheduler = Scheduler::new();
        let log = Arc::new(JobLog::new(open_connection(&db_path)?)?);
        let catalog = Arc::new(CatalogStore::new(open_connection(&db_path)?)?);
        let outbox = Arc::new(OutboxNotifier::new(open_connection(&db_path)?)?);
        let snapshots = Arc::new(SqliteBackup::new(
            open_connection(&db_path)?,
            config.backup.dir.clone(),
        ));

        let triggers = OfferTriggers::new(
            scheduler.clone(),
            Arc::clone(&log),
            catalog.clone(),
            catalog.clone(),
        );
        let backup = Arc::new(BackupSweep::new(snapshots));
        let expiry = Arc::new(ExpirySweep::new(
            catalog,
            outbox.clone(),
            Arc::clone(&log),
            ExpirySettings::from_config(&config.scheduler, &config.notify),
        ));

        Ok(Self {
            config,
            scheduler,
            log,
            triggers,
            backup,
            expiry,
            outbox,
        })
    }

    pub fn recovery(&self) -> RecoveryCoordinator {
        RecoveryCoordinator::new(self.triggers.clone())
    }
}

fn open_connection(path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Ok(())
}
