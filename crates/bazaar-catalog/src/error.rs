use bazaar_scheduler::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("backup task failed: {0}")]
    Backup(String),

    #[error(transparent)]
    Core(#[from] bazaar_core::BazaarError),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl From<CatalogError> for SchedulerError {
    fn from(e: CatalogError) -> Self {
        SchedulerError::Collaborator(e.to_string())
    }
}
