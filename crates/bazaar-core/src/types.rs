use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BazaarError, Result};

/// Opaque reference to a catalog product (its id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductRef(pub String);

impl ProductRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A promotional offer: a pricing window applied to an ordered list of products.
///
/// The scheduler only reads offers, and deletes them once their end trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub id: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    pub products: Vec<ProductRef>,
}

/// A published product as seen by the listing-expiration sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub product: ProductRef,
    pub title: String,
    /// Email of the owning user; `None` when the owner has no address on file.
    pub owner_email: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Parse an RFC 3339 timestamp as stored in SQLite text columns.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BazaarError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timestamp_normalises_offset() {
        let dt = parse_timestamp("2026-03-01T10:00:00+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-01T08:00:00+00:00");
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn product_ref_serialises_as_plain_string() {
        let json = serde_json::to_string(&vec![ProductRef::new("p-1")]).unwrap();
        assert_eq!(json, r#"["p-1"]"#);
    }
}
