use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    arming::OfferTriggers,
    engine::FireContext,
    error::Result,
    types::{JobKind, JobRecord, PROMO_OFFER_COLLECTION},
};

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Future jobs whose timers were registered again.
    pub rearmed: usize,
    /// Overdue jobs executed during the pass.
    pub fired: usize,
    /// Rows whose offer no longer exists; deleted.
    pub orphaned: usize,
    /// Rows whose recovery failed; left in place for the next pass.
    pub failed: usize,
    /// Rows with an unknown job name or collection; left in place.
    pub skipped: usize,
}

enum Outcome {
    Rearmed,
    Fired,
    Orphaned,
    Skipped,
}

/// Rebuilds live timers from the job log on process start.
///
/// Run once, before the process accepts requests that can arm new offer
/// triggers. Running it again, even on a started scheduler, is safe:
/// re-armed timers replace the ones registered under the same trigger
/// name, and overdue jobs execute under the scheduler's firing lock.
pub struct RecoveryCoordinator {
    triggers: OfferTriggers,
}

impl RecoveryCoordinator {
    pub fn new(triggers: OfferTriggers) -> Self {
        Self { triggers }
    }

    /// Reconcile against the current wall clock.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconcile_at(Utc::now()).await
    }

    /// Reconcile as if the current instant were `now`.
    ///
    /// Overdue jobs are executed inline, start jobs before end jobs, so an
    /// offer whose whole window elapsed during downtime gets its start
    /// effects and then its end effects. A failing row is logged and
    /// counted; the pass continues with the next one.
    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let mut jobs = self.triggers.job_log().list()?;
        // Stable: insertion order is kept within each kind.
        jobs.sort_by_key(|job| job.kind() == Some(JobKind::OfferEnd));

        info!(jobs = jobs.len(), now = %now, "reconciling job log");
        let mut report = ReconcileReport::default();
        for job in &jobs {
            match self.recover(job, now).await {
                Ok(Outcome::Rearmed) => report.rearmed += 1,
                Ok(Outcome::Fired) => report.fired += 1,
                Ok(Outcome::Orphaned) => report.orphaned += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(job_id = %job.id, name = %job.name, error = %e, "job recovery failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            rearmed = report.rearmed,
            fired = report.fired,
            orphaned = report.orphaned,
            failed = report.failed,
            skipped = report.skipped,
            "reconciliation complete"
        );
        Ok(report)
    }

    async fn recover(&self, job: &JobRecord, now: DateTime<Utc>) -> Result<Outcome> {
        if job.collection_name != PROMO_OFFER_COLLECTION {
            warn!(job_id = %job.id, collection = %job.collection_name, "unsupported collection; skipping");
            return Ok(Outcome::Skipped);
        }
        let Some(kind) = job.kind() else {
            warn!(job_id = %job.id, name = %job.name, "unknown job name; skipping");
            return Ok(Outcome::Skipped);
        };

        let offer_id = &job.referenced_entity_id;
        let scheduler = self.triggers.scheduler();
        let Some(offer) = self.triggers.offers().find_offer_by_id(offer_id).await? else {
            warn!(job_id = %job.id, %offer_id, "offer gone; removing orphaned job");
            scheduler
                .run_exclusive(async {
                    scheduler.cancel(&job.trigger_name());
                    self.triggers.job_log().remove(&job.id)
                })
                .await?;
            return Ok(Outcome::Orphaned);
        };

        let target = kind.target_of(&offer);
        if target <= now {
            info!(job_id = %job.id, %kind, %offer_id, target = %target, "job overdue; executing now");
            let name = job.trigger_name();
            let ctx = FireContext::detached(name.clone());
            scheduler
                .run_exclusive(async {
                    // No callback runs while the lock is held, so this only
                    // stops a pending timer from firing the job again. A live
                    // callback that got there first left no row behind, and
                    // `execute` then does nothing.
                    scheduler.cancel(&name);
                    self.triggers
                        .execute(kind, &job.id, offer_id, &offer.products, &ctx)
                        .await
                })
                .await?;
            Ok(Outcome::Fired)
        } else {
            self.triggers.rearm(job, kind, target, offer.products)?;
            info!(job_id = %job.id, %kind, %offer_id, target = %target, "job re-armed");
            Ok(Outcome::Rearmed)
        }
    }
}
