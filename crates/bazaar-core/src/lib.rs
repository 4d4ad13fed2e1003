//! `bazaar-core`: configuration, error type and the shared domain records
//! exchanged between the scheduler and the catalog.

pub mod config;
pub mod error;
pub mod types;

pub use config::BazaarConfig;
pub use error::{BazaarError, Result};
pub use types::{Listing, OfferRecord, ProductRef};
