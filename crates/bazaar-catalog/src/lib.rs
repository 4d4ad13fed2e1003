//! `bazaar-catalog`: SQLite-backed offers, products and outbound
//! notifications, implementing the collaborator traits the scheduler calls.

pub mod backup;
pub mod db;
pub mod error;
pub mod outbox;
pub mod store;
pub mod types;

pub use backup::SqliteBackup;
pub use error::{CatalogError, Result};
pub use outbox::OutboxNotifier;
pub use store::CatalogStore;
pub use types::{NewProduct, OutboxMessage, Product};
