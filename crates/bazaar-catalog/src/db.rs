use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Result};

/// Initialise catalog tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_offers_table(conn)?;
    create_products_table(conn)?;
    create_outbox_table(conn)?;
    Ok(())
}

/// Offers keep their product list as a JSON array of product ids.
fn create_offers_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS offers (
            id          TEXT NOT NULL PRIMARY KEY,
            start_at    TEXT NOT NULL,
            end_at      TEXT NOT NULL,
            products    TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL
        );",
    )
}

fn create_products_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS products (
            id                  TEXT NOT NULL PRIMARY KEY,
            title               TEXT NOT NULL,
            owner_email         TEXT,
            base_price_cents    INTEGER NOT NULL,
            offer_price_cents   INTEGER,
            active_price_cents  INTEGER NOT NULL,
            on_offer            INTEGER NOT NULL DEFAULT 0,
            published_at        TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_products_published
            ON products(published_at);",
    )
}

fn create_outbox_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notification_outbox (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient   TEXT NOT NULL,
            subject     TEXT NOT NULL,
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            sent_at     TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_outbox_pending
            ON notification_outbox(sent_at, id);",
    )
}

/// Fixed-width UTC timestamp so text comparison in SQL matches time order.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
