use std::sync::Arc;

use bazaar_core::{OfferRecord, ProductRef};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::{
    collab::{OfferStore, ProductMutator},
    engine::{FireContext, Scheduler},
    error::Result,
    joblog::JobLog,
    types::{trigger_name, JobKind, JobRecord, PROMO_OFFER_COLLECTION},
};

/// Arms and disarms the start/end triggers of promotional offers.
///
/// Every armed trigger has a job log row written *before* its timer is
/// registered, so a crash in between leaves a row recovery can replay.
#[derive(Clone)]
pub struct OfferTriggers {
    scheduler: Scheduler,
    log: Arc<JobLog>,
    offers: Arc<dyn OfferStore>,
    mutator: Arc<dyn ProductMutator>,
}

impl OfferTriggers {
    pub fn new(
        scheduler: Scheduler,
        log: Arc<JobLog>,
        offers: Arc<dyn OfferStore>,
        mutator: Arc<dyn ProductMutator>,
    ) -> Self {
        Self {
            scheduler,
            log,
            offers,
            mutator,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn job_log(&self) -> &Arc<JobLog> {
        &self.log
    }

    pub(crate) fn offers(&self) -> &Arc<dyn OfferStore> {
        &self.offers
    }

    /// Persist an `offer-start` job and arm its timer.
    pub fn arm_offer_start(
        &self,
        offer_id: &str,
        start: DateTime<Utc>,
        products: Vec<ProductRef>,
    ) -> Result<JobRecord> {
        self.arm(JobKind::OfferStart, offer_id, start, products)
    }

    /// Persist an `offer-end` job and arm its timer.
    pub fn arm_offer_end(
        &self,
        offer_id: &str,
        end: DateTime<Utc>,
        products: Vec<ProductRef>,
    ) -> Result<JobRecord> {
        self.arm(JobKind::OfferEnd, offer_id, end, products)
    }

    /// Arm both triggers of `offer`. Returns the (start, end) job rows.
    pub fn arm_offer(&self, offer: &OfferRecord) -> Result<(JobRecord, JobRecord)> {
        let start = self.arm_offer_start(&offer.id, offer.start_date_time, offer.products.clone())?;
        let end = self.arm_offer_end(&offer.id, offer.end_date_time, offer.products.clone())?;
        Ok((start, end))
    }

    /// Cancel the `kind` timer of `offer_id` and delete its job row.
    ///
    /// Returns whether anything was armed. Calling it again is a no-op. A
    /// callback already running is not interrupted; it stops at its next
    /// cancellation check.
    #[instrument(skip(self), fields(kind = %kind))]
    pub fn disarm(&self, kind: JobKind, offer_id: &str) -> Result<bool> {
        let cancelled = self.scheduler.cancel(&trigger_name(kind, offer_id));
        let removed = self.log.remove_for(kind, offer_id)?;
        if cancelled || removed {
            info!(offer_id, cancelled, removed, "offer trigger disarmed");
        }
        Ok(cancelled || removed)
    }

    /// Disarm both triggers of an offer, e.g. when it is deleted or edited.
    pub fn disarm_offer(&self, offer_id: &str) -> Result<bool> {
        let mut any = false;
        for kind in JobKind::ALL {
            any |= self.disarm(kind, offer_id)?;
        }
        Ok(any)
    }

    fn arm(
        &self,
        kind: JobKind,
        offer_id: &str,
        target: DateTime<Utc>,
        products: Vec<ProductRef>,
    ) -> Result<JobRecord> {
        let record = self
            .log
            .record(kind, PROMO_OFFER_COLLECTION, offer_id, target)?;
        self.rearm(&record, kind, target, products)?;
        info!(job_id = %record.id, %kind, offer_id, target = %target, "offer trigger armed");
        Ok(record)
    }

    /// Register the timer for an existing job row. The eventual firing
    /// deletes that same row.
    pub(crate) fn rearm(
        &self,
        record: &JobRecord,
        kind: JobKind,
        target: DateTime<Utc>,
        products: Vec<ProductRef>,
    ) -> Result<()> {
        let this = self.clone();
        let job_id = record.id.clone();
        let offer_id = record.referenced_entity_id.clone();
        self.scheduler
            .schedule(trigger_name(kind, &offer_id), target, move |ctx| async move {
                this.execute(kind, &job_id, &offer_id, &products, &ctx).await
            })
    }

    /// Apply the job's effects, then delete its row.
    ///
    /// A job whose row is already gone (completed by another path, or
    /// disarmed) does nothing. An end job first applies a start job still
    /// pending for the same offer, so effects land start-then-end whichever
    /// trigger reached the firing lock first. On failure the row is left in
    /// place and replayed by the next reconciliation.
    pub async fn execute(
        &self,
        kind: JobKind,
        job_id: &str,
        offer_id: &str,
        products: &[ProductRef],
        ctx: &FireContext,
    ) -> Result<()> {
        ctx.ensure_active()?;
        if self.log.get(job_id)?.is_none() {
            debug!(job_id, %kind, offer_id, "job row already gone; nothing to do");
            return Ok(());
        }
        match kind {
            JobKind::OfferStart => {
                if self.offers.find_offer_by_id(offer_id).await?.is_none() {
                    info!(job_id, offer_id, "offer gone before start; dropping job");
                    self.log.remove(job_id)?;
                    return Ok(());
                }
                ctx.ensure_active()?;
                self.mutator.apply_offer_start_effects(products).await?;
            }
            JobKind::OfferEnd => {
                self.settle_pending_start(offer_id, products, ctx).await?;
                ctx.ensure_active()?;
                self.mutator.apply_offer_end_effects(products).await?;
                ctx.ensure_active()?;
                self.offers.delete_offer(offer_id).await?;
            }
        }
        ctx.ensure_active()?;
        self.log.remove(job_id)?;
        info!(job_id, %kind, offer_id, products = products.len(), "offer job completed");
        Ok(())
    }

    /// Run the start effects of `offer_id` if its start job has not fired yet,
    /// and retire that job's timer and row.
    async fn settle_pending_start(
        &self,
        offer_id: &str,
        products: &[ProductRef],
        ctx: &FireContext,
    ) -> Result<()> {
        let Some(start) = self.log.find(JobKind::OfferStart, offer_id)? else {
            return Ok(());
        };
        self.scheduler
            .cancel(&trigger_name(JobKind::OfferStart, offer_id));
        ctx.ensure_active()?;
        self.mutator.apply_offer_start_effects(products).await?;
        self.log.remove(&start.id)?;
        info!(job_id = %start.id, offer_id, "pending start applied ahead of end");
        Ok(())
    }
}
