//! Recurring sweeps: database backup and listing-expiration warnings.
//!
//! Sweeps are never written to the job log. They are registered fresh on
//! every start; a cycle missed while the process was down is not replayed.

use std::sync::Arc;

use bazaar_core::config::{ExpiryWindow, NotifyConfig, SchedulerConfig};
use bazaar_core::Listing;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    collab::{BackupRunner, ListingQuery, Notifier},
    engine::{FireContext, Scheduler},
    error::{Result, SchedulerError},
    joblog::JobLog,
    timeutil::day_window,
};

pub const BACKUP_SWEEP: &str = "backup-sweep";
pub const EXPIRY_SWEEP: &str = "listing-expiry-sweep";

/// Invokes the backup collaborator on every firing.
pub struct BackupSweep {
    runner: Arc<dyn BackupRunner>,
}

impl BackupSweep {
    pub fn new(runner: Arc<dyn BackupRunner>) -> Self {
        Self { runner }
    }

    pub async fn run(&self, ctx: &FireContext) -> Result<()> {
        ctx.ensure_active()?;
        self.runner.run_database_backup().await?;
        info!("database backup complete");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExpirySettings {
    pub days: u32,
    pub window: ExpiryWindow,
    pub subject: String,
}

impl ExpirySettings {
    pub fn from_config(scheduler: &SchedulerConfig, notify: &NotifyConfig) -> Self {
        Self {
            days: scheduler.expiry_days,
            window: scheduler.expiry_window,
            subject: notify.subject.clone(),
        }
    }
}

/// Outcome counts of one expiration sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub matched: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Warns owners of listings published `days` days ago.
pub struct ExpirySweep {
    listings: Arc<dyn ListingQuery>,
    notifier: Arc<dyn Notifier>,
    log: Arc<JobLog>,
    settings: ExpirySettings,
}

impl ExpirySweep {
    pub fn new(
        listings: Arc<dyn ListingQuery>,
        notifier: Arc<dyn Notifier>,
        log: Arc<JobLog>,
        settings: ExpirySettings,
    ) -> Self {
        Self {
            listings,
            notifier,
            log,
            settings,
        }
    }

    /// Publish-date window `[start, end)` the sweep covers at `now`.
    ///
    /// `CalendarDay` covers the single day `days` before `now`. `Watermark`
    /// covers every whole day from the previous sweep's upper bound through
    /// that same day, so downtime never skips a day and repeated firings on
    /// one day produce an empty window.
    pub fn window(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let (day_start, day_end) = day_window(now, self.settings.days);
        match self.settings.window {
            ExpiryWindow::CalendarDay => Ok((day_start, day_end)),
            ExpiryWindow::Watermark => {
                let lower = self.log.watermark(EXPIRY_SWEEP)?.unwrap_or(day_start);
                Ok((lower.min(day_end), day_end))
            }
        }
    }

    /// Run one sweep as of `now` outside the scheduler.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        self.run(now, &FireContext::detached(EXPIRY_SWEEP)).await
    }

    /// Notify every listing in the window. Failures are isolated per listing.
    pub async fn run(&self, now: DateTime<Utc>, ctx: &FireContext) -> Result<SweepReport> {
        ctx.ensure_active()?;
        let (start, end) = self.window(now)?;
        let mut report = SweepReport::default();
        if start >= end {
            info!(start = %start, "expiry window already swept");
            return Ok(report);
        }

        let listings = self
            .listings
            .query_products_published_between(start, end)
            .await?;
        report.matched = listings.len();

        for listing in &listings {
            ctx.ensure_active()?;
            match self.notify(listing).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    warn!(product_id = %listing.product, error = %e, "expiration notice failed");
                    report.failed += 1;
                }
            }
        }

        if self.settings.window == ExpiryWindow::Watermark {
            self.log.set_watermark(EXPIRY_SWEEP, end)?;
        }
        info!(
            start = %start,
            end = %end,
            matched = report.matched,
            notified = report.notified,
            failed = report.failed,
            "expiry sweep complete"
        );
        Ok(report)
    }

    async fn notify(&self, listing: &Listing) -> Result<()> {
        let Some(to) = listing.owner_email.as_deref().filter(|e| !e.is_empty()) else {
            return Err(SchedulerError::Collaborator(format!(
                "listing {} has no owner email",
                listing.product
            )));
        };
        let body = format!(
            "Your listing \"{}\" was published {} days ago and will expire soon. \
             Renew it to keep it visible.",
            listing.title, self.settings.days
        );
        self.notifier
            .send_notification_email(to, &self.settings.subject, &body)
            .await
    }
}

/// Register both sweeps on `scheduler` under their fixed names.
pub fn register_sweeps(
    scheduler: &Scheduler,
    config: &SchedulerConfig,
    backup: Arc<BackupSweep>,
    expiry: Arc<ExpirySweep>,
) -> Result<()> {
    scheduler.schedule_recurring(BACKUP_SWEEP, &config.backup_cron, move |ctx| {
        let backup = Arc::clone(&backup);
        async move { backup.run(&ctx).await }
    })?;
    scheduler.schedule_recurring(EXPIRY_SWEEP, &config.expiry_cron, move |ctx| {
        let expiry = Arc::clone(&expiry);
        async move { expiry.run(Utc::now(), &ctx).await.map(|_| ()) }
    })?;
    Ok(())
}
