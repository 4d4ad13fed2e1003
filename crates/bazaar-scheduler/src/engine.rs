use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    schedule::CronSchedule,
    timeutil::delay_until,
};

/// Longest single sleep before the wall clock is re-read, so clock jumps
/// and host suspends delay a trigger by at most this much.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Handed to every trigger callback.
///
/// Callbacks check [`FireContext::ensure_active`] before each side-effecting
/// step; a trigger cancelled mid-flight then stops at the next step instead
/// of running to completion.
#[derive(Debug, Clone)]
pub struct FireContext {
    name: String,
    token: CancellationToken,
}

impl FireContext {
    /// A context that is never cancelled, for running a trigger's work
    /// outside the scheduler (e.g. overdue jobs during recovery).
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(Cancelled)` once the trigger has been cancelled or the scheduler stopped.
    pub fn ensure_active(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(SchedulerError::Cancelled {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Registry slot for one live trigger.
struct Entry {
    /// Distinguishes a trigger from a later replacement registered under the same name.
    seq: u64,
    token: CancellationToken,
    target: Option<DateTime<Utc>>,
}

struct Inner {
    triggers: Mutex<HashMap<String, Entry>>,
    next_seq: AtomicU64,
    /// Held while a callback runs: at most one callback executes at a time.
    fire_lock: tokio::sync::Mutex<()>,
    started: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl Inner {
    fn triggers(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.triggers
            .lock()
            .map_err(|_| SchedulerError::LockPoisoned("trigger registry"))
    }

    /// Park until `start()` is called. Returns `false` if cancelled first.
    async fn wait_started(&self, token: &CancellationToken) -> bool {
        let mut rx = self.started.subscribe();
        tokio::select! {
            res = rx.wait_for(|started| *started) => res.is_ok(),
            _ = token.cancelled() => false,
        }
    }

    /// Sleep until the wall clock reaches `at`. Returns `false` if cancelled first.
    async fn sleep_until(&self, at: DateTime<Utc>, token: &CancellationToken) -> bool {
        loop {
            let delay = delay_until(at, Utc::now());
            if delay.is_zero() {
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay.min(MAX_SLEEP)) => {}
                _ = token.cancelled() => return false,
            }
        }
    }

    /// Drop the registry entry for `name` if it still belongs to trigger `seq`.
    fn retire(&self, name: &str, seq: u64) {
        match self.triggers() {
            Ok(mut triggers) => {
                if triggers.get(name).is_some_and(|e| e.seq == seq) {
                    triggers.remove(name);
                }
            }
            Err(e) => error!(trigger = %name, "retire failed: {e}"),
        }
    }
}

/// Run one callback to completion, logging its outcome. Errors and panics
/// stop here; they never reach the scheduler task or other triggers.
async fn run_callback<Fut>(name: &str, fut: Fut)
where
    Fut: Future<Output = Result<()>>,
{
    let started = Instant::now();
    let outcome = AssertUnwindSafe(fut).catch_unwind().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(Ok(())) => info!(trigger = %name, elapsed_ms, "trigger fired"),
        Ok(Err(SchedulerError::Cancelled { .. })) => {
            warn!(trigger = %name, elapsed_ms, "trigger cancelled mid-flight")
        }
        Ok(Err(e)) => error!(trigger = %name, elapsed_ms, error = %e, "trigger callback failed"),
        Err(_) => error!(trigger = %name, elapsed_ms, "trigger callback panicked"),
    }
}

/// In-process timer registry.
///
/// Cheap to clone; clones share the same registry. Triggers can be
/// registered before [`Scheduler::start`] but none fires until it is called.
/// All callbacks are serialised through one firing lock, while registration
/// stays synchronous and never waits on a running callback.
///
/// Registration spawns a tokio task, so it must happen inside a runtime.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (started, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                triggers: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
                fire_lock: tokio::sync::Mutex::new(()),
                started,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Allow triggers to fire. Idempotent.
    pub fn start(&self) {
        if !self.inner.started.send_replace(true) {
            info!(pending = self.len(), "scheduler started");
        }
    }

    /// Cancel every pending trigger and refuse new registrations.
    ///
    /// A callback already running sees its context cancelled and stops at
    /// its next [`FireContext::ensure_active`] check.
    pub fn stop(&self) {
        self.inner.shutdown.cancel();
        match self.inner.triggers() {
            Ok(mut triggers) => {
                for (_, entry) in triggers.drain() {
                    entry.token.cancel();
                }
            }
            Err(e) => error!("scheduler stop: {e}"),
        }
        info!("scheduler stopped");
    }

    /// Wait until no callback is running.
    pub async fn wait_idle(&self) {
        let _guard = self.inner.fire_lock.lock().await;
    }

    /// Run `fut` under the firing lock, so it never overlaps a trigger
    /// callback.
    pub(crate) async fn run_exclusive<Fut: Future>(&self, fut: Fut) -> Fut::Output {
        let _guard = self.inner.fire_lock.lock().await;
        fut.await
    }

    pub fn is_running(&self) -> bool {
        *self.inner.started.borrow() && !self.inner.shutdown.is_cancelled()
    }

    /// Register `action` to run once at `at`. A past `at` fires as soon as
    /// the scheduler is started and free.
    ///
    /// Registering a name that is already pending replaces the old trigger.
    pub fn schedule<F, Fut>(&self, name: impl Into<String>, at: DateTime<Utc>, action: F) -> Result<()>
    where
        F: FnOnce(FireContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let (seq, token) = self.register(&name, Some(at))?;
        let inner = Arc::clone(&self.inner);
        let ctx = FireContext {
            name: name.clone(),
            token: token.clone(),
        };

        tokio::spawn(async move {
            if !inner.wait_started(&token).await || !inner.sleep_until(at, &token).await {
                debug!(trigger = %name, "trigger cancelled before firing");
                return;
            }
            let _guard = inner.fire_lock.lock().await;
            if token.is_cancelled() {
                debug!(trigger = %name, "trigger cancelled while waiting to fire");
                return;
            }
            run_callback(&name, async move { action(ctx).await }).await;
            inner.retire(&name, seq);
        });
        Ok(())
    }

    /// Register `action` to run at every occurrence of `cron_expression`
    /// (5- or 6-field, UTC) until cancelled or the scheduler stops.
    pub fn schedule_recurring<F, Fut>(
        &self,
        name: impl Into<String>,
        cron_expression: &str,
        action: F,
    ) -> Result<()>
    where
        F: Fn(FireContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cron = CronSchedule::parse(cron_expression)?;
        let name = name.into();
        let (seq, token) = self.register(&name, None)?;
        let inner = Arc::clone(&self.inner);
        let ctx = FireContext {
            name: name.clone(),
            token: token.clone(),
        };
        info!(trigger = %name, cron = %cron.expression(), "recurring trigger registered");

        tokio::spawn(async move {
            if !inner.wait_started(&token).await {
                return;
            }
            loop {
                let Some(next) = cron.next_after(Utc::now()) else {
                    warn!(trigger = %name, "cron expression has no further occurrences");
                    break;
                };
                debug!(trigger = %name, next = %next, "recurring trigger armed");
                if !inner.sleep_until(next, &token).await {
                    return;
                }
                let _guard = inner.fire_lock.lock().await;
                if token.is_cancelled() {
                    return;
                }
                run_callback(&name, async { action(ctx.clone()).await }).await;
            }
            inner.retire(&name, seq);
        });
        Ok(())
    }

    /// Cancel a pending trigger by name. Returns `false` (not an error) when
    /// nothing was registered under that name.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = match self.inner.triggers() {
            Ok(mut triggers) => triggers.remove(name),
            Err(e) => {
                error!(trigger = %name, "cancel failed: {e}");
                None
            }
        };
        match removed {
            Some(entry) => {
                entry.token.cancel();
                debug!(trigger = %name, "trigger cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.inner
            .triggers()
            .map(|t| t.contains_key(name))
            .unwrap_or(false)
    }

    /// Target instant of a pending one-shot trigger.
    pub fn target_of(&self, name: &str) -> Option<DateTime<Utc>> {
        self.inner
            .triggers()
            .ok()
            .and_then(|t| t.get(name).and_then(|e| e.target))
    }

    /// Names of all pending triggers, sorted.
    pub fn pending(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .triggers()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.triggers().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, name: &str, target: Option<DateTime<Utc>>) -> Result<(u64, CancellationToken)> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.shutdown.child_token();
        let previous = self.inner.triggers()?.insert(
            name.to_string(),
            Entry {
                seq,
                token: token.clone(),
                target,
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            debug!(trigger = %name, "pending trigger replaced");
        }
        Ok((seq, token))
    }
}
