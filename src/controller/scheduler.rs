//! # Scheduler
//!
//! Runs reconciliations after a delay, with at most one pending run per
//! object key and a global cap on runs in flight.
//!
//! Scheduling a key that already has a pending (still waiting) run replaces
//! it, so a watch event cancels a three hour refresh timer and the run it
//! starts schedules the next one. A run that has started is never cancelled;
//! anything scheduled meanwhile runs after its own delay.

use crate::controller::reconciler::{
    ObjectKey, ReconcileOutcome, Reconciler, ResourceKind, TriggerSource,
};
use crate::runtime::error_policy;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Something that can reconcile an object by key
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    async fn reconcile(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        trigger: TriggerSource,
    ) -> ReconcileOutcome;
}

#[async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        trigger: TriggerSource,
    ) -> ReconcileOutcome {
        match kind {
            ResourceKind::Secret => self.reconcile_secret(key, trigger).await,
            ResourceKind::ServiceAccount => self.reconcile_service_account(key, trigger).await,
        }
    }
}

type PendingKey = (ResourceKind, ObjectKey);

struct Inner<R> {
    reconciler: Arc<R>,
    permits: Semaphore,
    next_ticket: AtomicU64,
    pending: Mutex<HashMap<PendingKey, u64>>,
}

pub struct Scheduler<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for Scheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> std::fmt::Debug for Scheduler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("available_permits", &self.inner.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl<R: Reconcile> Scheduler<R> {
    #[must_use]
    pub fn new(reconciler: Arc<R>, max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                reconciler,
                permits: Semaphore::new(max_concurrent.max(1)),
                next_ticket: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Reconcile `key` after `delay`, replacing any run still waiting for it
    pub fn schedule(
        &self,
        kind: ResourceKind,
        key: ObjectKey,
        delay: Duration,
        trigger: TriggerSource,
    ) {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let pending_key = (kind, key);
        self.pending()
            .insert(pending_key.clone(), ticket);

        let scheduler = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !scheduler.claim(&pending_key, ticket) {
                debug!(
                    kind = pending_key.0.as_str(),
                    key = %pending_key.1,
                    "Scheduled reconciliation superseded"
                );
                return;
            }
            scheduler.run(pending_key.0, pending_key.1, trigger).await;
        });
    }

    /// Number of runs waiting for their delay to pass
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<PendingKey, u64>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the pending slot if `ticket` still owns it
    fn claim(&self, pending_key: &PendingKey, ticket: u64) -> bool {
        let mut pending = self.pending();
        if pending.get(pending_key) == Some(&ticket) {
            pending.remove(pending_key);
            true
        } else {
            false
        }
    }

    async fn run(&self, kind: ResourceKind, key: ObjectKey, trigger: TriggerSource) {
        let Ok(_permit) = self.inner.permits.acquire().await else {
            return;
        };

        let outcome = self.inner.reconciler.reconcile(kind, &key, trigger).await;
        error_policy::report_outcome(kind, &key, &outcome);

        if let Some(after) = outcome.requeue_after {
            let next_trigger = if outcome.is_success() {
                TriggerSource::Timer
            } else {
                trigger.on_retry()
            };
            self.schedule(kind, key, after, next_trigger);
        }
    }
}
