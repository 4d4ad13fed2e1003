use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The provided schedule definition is invalid or unsupported.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A job name this build does not handle.
    #[error("Unknown job kind: {0}")]
    UnknownJobKind(String),

    /// The scheduler has been stopped and accepts no new triggers.
    #[error("Scheduler is stopped")]
    Stopped,

    /// The trigger was disarmed while its callback was in flight.
    #[error("Trigger cancelled: {name}")]
    Cancelled { name: String },

    /// An external collaborator (offer store, mailer, backup) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// A mutex guarding shared state was poisoned by a panicking holder.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error(transparent)]
    Core(#[from] bazaar_core::BazaarError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
