#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bazaar_core::{Listing, OfferRecord, ProductRef};
use bazaar_scheduler::collab::{BackupRunner, ListingQuery, Notifier, OfferStore, ProductMutator};
use bazaar_scheduler::{JobLog, OfferTriggers, Scheduler, SchedulerError};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Observable side effect applied through a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Start(Vec<ProductRef>),
    End(Vec<ProductRef>),
    OfferDeleted(String),
}

/// In-process stand-in for the catalog layer that records every call.
#[derive(Default)]
pub struct FakeCatalog {
    offers: Mutex<HashMap<String, OfferRecord>>,
    effects: Mutex<Vec<Effect>>,
    pub fail_mutations: AtomicBool,
    listings: Mutex<Vec<Listing>>,
    sent: Mutex<Vec<(String, String, String)>>,
    failing_recipients: Mutex<HashSet<String>>,
    pub backups: AtomicUsize,
}

impl FakeCatalog {
    pub fn insert_offer(&self, offer: OfferRecord) {
        self.offers.lock().unwrap().insert(offer.id.clone(), offer);
    }

    pub fn remove_offer(&self, id: &str) {
        self.offers.lock().unwrap().remove(id);
    }

    pub fn has_offer(&self, id: &str) -> bool {
        self.offers.lock().unwrap().contains_key(id)
    }

    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().unwrap().clone()
    }

    pub fn insert_listing(&self, listing: Listing) {
        self.listings.lock().unwrap().push(listing);
    }

    pub fn fail_recipient(&self, email: &str) {
        self.failing_recipients.lock().unwrap().insert(email.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn mutation(&self, effect: Effect) -> bazaar_scheduler::Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(SchedulerError::Collaborator("products table locked".into()));
        }
        self.effects.lock().unwrap().push(effect);
        Ok(())
    }
}

#[async_trait]
impl OfferStore for FakeCatalog {
    async fn find_offer_by_id(&self, id: &str) -> bazaar_scheduler::Result<Option<OfferRecord>> {
        Ok(self.offers.lock().unwrap().get(id).cloned())
    }

    async fn delete_offer(&self, id: &str) -> bazaar_scheduler::Result<()> {
        self.offers.lock().unwrap().remove(id);
        self.effects
            .lock()
            .unwrap()
            .push(Effect::OfferDeleted(id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ProductMutator for FakeCatalog {
    async fn apply_offer_start_effects(&self, products: &[ProductRef]) -> bazaar_scheduler::Result<()> {
        self.mutation(Effect::Start(products.to_vec()))
    }

    async fn apply_offer_end_effects(&self, products: &[ProductRef]) -> bazaar_scheduler::Result<()> {
        self.mutation(Effect::End(products.to_vec()))
    }
}

#[async_trait]
impl ListingQuery for FakeCatalog {
    async fn query_products_published_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bazaar_scheduler::Result<Vec<Listing>> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.published_at >= start && l.published_at < end)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Notifier for FakeCatalog {
    async fn send_notification_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> bazaar_scheduler::Result<()> {
        if self.failing_recipients.lock().unwrap().contains(to) {
            return Err(SchedulerError::Collaborator(format!("mailbox {to} unavailable")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[async_trait]
impl BackupRunner for FakeCatalog {
    async fn run_database_backup(&self) -> bazaar_scheduler::Result<()> {
        self.backups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One "process": a scheduler and arming front-end over a shared job log
/// and catalog. `restart` simulates a crash and a fresh start.
pub struct Harness {
    pub catalog: Arc<FakeCatalog>,
    pub log: Arc<JobLog>,
    pub scheduler: Scheduler,
    pub triggers: OfferTriggers,
}

impl Harness {
    pub fn new() -> Self {
        let catalog = Arc::new(FakeCatalog::default());
        let log = Arc::new(JobLog::new(Connection::open_in_memory().unwrap()).unwrap());
        Self::assemble(catalog, log)
    }

    /// Stop this process's scheduler and build a new one over the same state.
    pub fn restart(self) -> Self {
        self.scheduler.stop();
        Self::assemble(self.catalog, self.log)
    }

    fn assemble(catalog: Arc<FakeCatalog>, log: Arc<JobLog>) -> Self {
        let scheduler = Scheduler::new();
        let triggers = OfferTriggers::new(
            scheduler.clone(),
            Arc::clone(&log),
            catalog.clone(),
            catalog.clone(),
        );
        Self {
            catalog,
            log,
            scheduler,
            triggers,
        }
    }

    pub fn offer(&self, id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> OfferRecord {
        let offer = OfferRecord {
            id: id.to_string(),
            start_date_time: start,
            end_date_time: end,
            products: vec![ProductRef::new(format!("{id}-p1")), ProductRef::new(format!("{id}-p2"))],
        };
        self.catalog.insert_offer(offer.clone());
        offer
    }
}

/// Poll `cond` every 10 ms for up to 5 s.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
