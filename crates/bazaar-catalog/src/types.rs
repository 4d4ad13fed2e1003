use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog product with its pricing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub owner_email: Option<String>,
    /// Regular price.
    pub base_price_cents: i64,
    /// Price while a promotional offer is running; `None` means no discount.
    pub offer_price_cents: Option<i64>,
    /// Price currently charged.
    pub active_price_cents: i64,
    pub on_offer: bool,
    pub published_at: DateTime<Utc>,
}

/// Input for [`crate::CatalogStore::upsert_product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub id: String,
    pub title: String,
    pub owner_email: Option<String>,
    pub base_price_cents: i64,
    pub offer_price_cents: Option<i64>,
    pub published_at: DateTime<Utc>,
}

/// A queued notification waiting for the mail relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: i64,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: String,
}
