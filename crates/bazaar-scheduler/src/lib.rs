//! `bazaar-scheduler`: durable timed jobs for the bazaar back office.
//!
//! # Overview
//!
//! Promotional offers switch product pricing on at their start instant and
//! off at their end instant. Each armed switch is a [`JobRecord`] row in the
//! SQLite job log plus an in-memory trigger in the [`Scheduler`]. When the
//! trigger fires it applies the effects and deletes its row; on restart the
//! [`RecoveryCoordinator`] replays the log, executing overdue jobs inline and
//! re-arming the rest.
//!
//! | Component             | Module     |
//! |-----------------------|------------|
//! | Timer registry        | `engine`   |
//! | Job log               | `joblog`   |
//! | Offer trigger arming  | `arming`   |
//! | Startup recovery      | `recovery` |
//! | Backup / expiry sweeps| `sweep`    |
//!
//! Delivery is at-least-once: a firing that fails leaves its row behind and
//! is retried by the next reconciliation.

pub mod arming;
pub mod collab;
pub mod db;
pub mod engine;
pub mod error;
pub mod joblog;
pub mod recovery;
pub mod schedule;
pub mod sweep;
pub mod timeutil;
pub mod types;

pub use arming::OfferTriggers;
pub use engine::{FireContext, Scheduler};
pub use error::{Result, SchedulerError};
pub use joblog::JobLog;
pub use recovery::{ReconcileReport, RecoveryCoordinator};
pub use sweep::{register_sweeps, BackupSweep, ExpirySettings, ExpirySweep, SweepReport};
pub use types::{JobKind, JobRecord, PROMO_OFFER_COLLECTION};
