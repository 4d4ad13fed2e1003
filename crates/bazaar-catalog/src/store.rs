use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bazaar_core::types::parse_timestamp;
use bazaar_core::{Listing, OfferRecord, ProductRef};
use bazaar_scheduler::collab::{ListingQuery, OfferStore, ProductMutator};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::db::{init_db, ts};
use crate::error::{CatalogError, Result};
use crate::types::{NewProduct, Product};

const START_PRICING_SQL: &str = "UPDATE products
     SET active_price_cents = COALESCE(offer_price_cents, base_price_cents),
         on_offer = 1, updated_at = ?2
     WHERE id = ?1";

const END_PRICING_SQL: &str = "UPDATE products
     SET active_price_cents = base_price_cents, on_offer = 0, updated_at = ?2
     WHERE id = ?1";

/// Offers and products in SQLite.
///
/// Wraps a single connection in a `Mutex`; every method is one or a few
/// short statements.
pub struct CatalogStore {
    db: Mutex<Connection>,
}

impl CatalogStore {
    /// Wrap `conn`, initialising the catalog schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| CatalogError::LockPoisoned("catalog"))
    }

    /// Insert or replace an offer.
    #[instrument(skip(self, offer), fields(offer_id = %offer.id))]
    pub fn save_offer(&self, offer: &OfferRecord) -> Result<()> {
        let products = serde_json::to_string(&offer.products)?;
        let db = self.db()?;
        db.execute(
            "INSERT INTO offers (id, start_at, end_at, products, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                products = excluded.products",
            rusqlite::params![
                offer.id,
                ts(offer.start_date_time),
                ts(offer.end_date_time),
                products,
                ts(Utc::now())
            ],
        )?;
        debug!("offer saved");
        Ok(())
    }

    pub fn offer(&self, id: &str) -> Result<Option<OfferRecord>> {
        let db = self.db()?;
        let row = db
            .query_row(
                "SELECT id, start_at, end_at, products FROM offers WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, start_at, end_at, products)) = row else {
            return Ok(None);
        };
        Ok(Some(OfferRecord {
            id,
            start_date_time: parse_timestamp(&start_at)?,
            end_date_time: parse_timestamp(&end_at)?,
            products: serde_json::from_str(&products)?,
        }))
    }

    /// Delete an offer. Returns `false` when it did not exist.
    #[instrument(skip(self))]
    pub fn remove_offer(&self, id: &str) -> Result<bool> {
        let db = self.db()?;
        let n = db.execute("DELETE FROM offers WHERE id = ?1", [id])?;
        if n > 0 {
            info!("offer deleted");
        }
        Ok(n > 0)
    }

    /// Insert or update a product. A new product starts at its base price.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub fn upsert_product(&self, product: &NewProduct) -> Result<()> {
        let db = self.db()?;
        db.execute(
            "INSERT INTO products
             (id, title, owner_email, base_price_cents, offer_price_cents,
              active_price_cents, on_offer, published_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?4, 0, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                owner_email = excluded.owner_email,
                base_price_cents = excluded.base_price_cents,
                offer_price_cents = excluded.offer_price_cents,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at",
            rusqlite::params![
                product.id,
                product.title,
                product.owner_email,
                product.base_price_cents,
                product.offer_price_cents,
                ts(product.published_at),
                ts(Utc::now())
            ],
        )?;
        Ok(())
    }

    pub fn product(&self, id: &str) -> Result<Option<Product>> {
        let db = self.db()?;
        let row = db
            .query_row(
                "SELECT id, title, owner_email, base_price_cents, offer_price_cents,
                        active_price_cents, on_offer, published_at
                 FROM products WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i32>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, title, owner_email, base, offer, active, on_offer, published_at)) = row
        else {
            return Ok(None);
        };
        Ok(Some(Product {
            id,
            title,
            owner_email,
            base_price_cents: base,
            offer_price_cents: offer,
            active_price_cents: active,
            on_offer: on_offer != 0,
            published_at: parse_timestamp(&published_at)?,
        }))
    }

    /// Products published in `[start, end)`, oldest first.
    pub fn published_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Listing>> {
        let db = self.db()?;
        let mut stmt = db.prepare(
            "SELECT id, title, owner_email, published_at FROM products
             WHERE published_at >= ?1 AND published_at < ?2
             ORDER BY published_at, id",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![ts(start), ts(end)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut listings = Vec::with_capacity(rows.len());
        for (id, title, owner_email, published_at) in rows {
            listings.push(Listing {
                product: ProductRef(id),
                title,
                owner_email,
                published_at: parse_timestamp(&published_at)?,
            });
        }
        Ok(listings)
    }

    /// Apply one pricing statement to each product. A product that is missing
    /// or fails to update is logged and skipped. Returns how many changed.
    fn reprice(&self, products: &[ProductRef], sql: &str, phase: &str) -> Result<usize> {
        let db = self.db()?;
        let now = ts(Utc::now());
        let mut updated = 0;
        for product in products {
            match db.execute(sql, rusqlite::params![product.as_str(), now]) {
                Ok(0) => warn!(product_id = %product, phase, "product not found; skipped"),
                Ok(_) => updated += 1,
                Err(e) => warn!(product_id = %product, phase, error = %e, "repricing failed"),
            }
        }
        info!(phase, updated, total = products.len(), "products repriced");
        Ok(updated)
    }
}

#[async_trait]
impl OfferStore for CatalogStore {
    async fn find_offer_by_id(&self, id: &str) -> bazaar_scheduler::Result<Option<OfferRecord>> {
        Ok(self.offer(id)?)
    }

    async fn delete_offer(&self, id: &str) -> bazaar_scheduler::Result<()> {
        self.remove_offer(id)?;
        Ok(())
    }
}

#[async_trait]
impl ProductMutator for CatalogStore {
    async fn apply_offer_start_effects(&self, products: &[ProductRef]) -> bazaar_scheduler::Result<()> {
        self.reprice(products, START_PRICING_SQL, "offer-start")?;
        Ok(())
    }

    async fn apply_offer_end_effects(&self, products: &[ProductRef]) -> bazaar_scheduler::Result<()> {
        self.reprice(products, END_PRICING_SQL, "offer-end")?;
        Ok(())
    }
}

#[async_trait]
impl ListingQuery for CatalogStore {
    async fn query_products_published_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bazaar_scheduler::Result<Vec<Listing>> {
        Ok(self.published_between(start, end)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn store() -> CatalogStore {
        CatalogStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn product(id: &str, offer_price: Option<i64>, published_at: DateTime<Utc>) -> NewProduct {
        NewProduct {
            id: id.into(),
            title: format!("Item {id}"),
            owner_email: Some(format!("{id}@example.com")),
            base_price_cents: 10_000,
            offer_price_cents: offer_price,
            published_at,
        }
    }

    #[tokio::test]
    async fn offer_effects_switch_active_price() {
        let store = store();
        store.upsert_product(&product("a", Some(7_500), Utc::now())).unwrap();
        store.upsert_product(&product("b", None, Utc::now())).unwrap();
        let refs = vec![ProductRef::new("a"), ProductRef::new("b"), ProductRef::new("missing")];

        store.apply_offer_start_effects(&refs).await.unwrap();
        let a = store.product("a").unwrap().unwrap();
        assert_eq!(a.active_price_cents, 7_500);
        assert!(a.on_offer);
        assert_eq!(store.product("b").unwrap().unwrap().active_price_cents, 10_000);

        store.apply_offer_end_effects(&refs).await.unwrap();
        let a = store.product("a").unwrap().unwrap();
        assert_eq!(a.active_price_cents, 10_000);
        assert!(!a.on_offer);
    }

    #[tokio::test]
    async fn offers_round_trip_and_delete() {
        let store = store();
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();
        let offer = OfferRecord {
            id: "o-1".into(),
            start_date_time: start,
            end_date_time: start + Duration::days(3),
            products: vec![ProductRef::new("a"), ProductRef::new("b")],
        };
        store.save_offer(&offer).unwrap();
        assert_eq!(store.find_offer_by_id("o-1").await.unwrap(), Some(offer));

        store.delete_offer("o-1").await.unwrap();
        assert!(store.find_offer_by_id("o-1").await.unwrap().is_none());
        // Deleting again is fine.
        store.delete_offer("o-1").await.unwrap();
    }

    #[tokio::test]
    async fn published_between_is_half_open() {
        let store = store();
        let day = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        store.upsert_product(&product("first", None, day)).unwrap();
        store
            .upsert_product(&product("late", None, day + Duration::hours(23)))
            .unwrap();
        store
            .upsert_product(&product("next", None, day + Duration::days(1)))
            .unwrap();

        let listings = store
            .query_products_published_between(day, day + Duration::days(1))
            .await
            .unwrap();
        let ids: Vec<_> = listings.iter().map(|l| l.product.as_str()).collect();
        assert_eq!(ids, ["first", "late"]);
        assert_eq!(listings[0].owner_email.as_deref(), Some("first@example.com"));
    }
}
