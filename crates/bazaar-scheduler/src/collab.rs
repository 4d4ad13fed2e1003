//! Narrow contracts the scheduler consumes from the catalog layer.
//!
//! The scheduler never touches offers or products directly; it calls these
//! traits. `bazaar-catalog` provides SQLite-backed implementations.

use async_trait::async_trait;
use bazaar_core::{Listing, OfferRecord, ProductRef};
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Read/delete access to promotional offers.
#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn find_offer_by_id(&self, id: &str) -> Result<Option<OfferRecord>>;

    /// Delete an offer. Deleting an absent offer is not an error.
    async fn delete_offer(&self, id: &str) -> Result<()>;
}

/// Applies pricing changes when an offer starts or ends.
///
/// Implementations log per-product failures and carry on with the rest of
/// the batch; an `Err` means the batch as a whole could not be applied.
#[async_trait]
pub trait ProductMutator: Send + Sync {
    async fn apply_offer_start_effects(&self, products: &[ProductRef]) -> Result<()>;

    async fn apply_offer_end_effects(&self, products: &[ProductRef]) -> Result<()>;
}

/// Query side of the catalog used by the listing-expiration sweep.
#[async_trait]
pub trait ListingQuery: Send + Sync {
    /// Listings whose publish date falls in `[start, end)`.
    async fn query_products_published_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Listing>>;
}

/// Outbound notification channel (email in production).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Produces a database backup.
#[async_trait]
pub trait BackupRunner: Send + Sync {
    async fn run_database_backup(&self) -> Result<()>;
}
