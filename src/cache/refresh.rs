//! Supervised background refreshes.
//!
//! Each refresh runs on a [`JoinSet`] owned by the scheduler, bounded by a
//! timeout, and keyed by cache key so invalidation can abort it and shutdown
//! can drain it.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, histogram};
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::mutex_lock;
use super::store::{CacheStore, RefreshTicket};

const SOURCE: &str = "cache::refresh";
const METRIC_REFRESH_TOTAL: &str = "scriptorium_cache_refresh_total";
const METRIC_REFRESH_MS: &str = "scriptorium_cache_refresh_ms";

/// How a background refresh ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fresh value replaced the stale one.
    Committed,
    /// The value arrived after the key was invalidated or re-claimed.
    Superseded,
    /// The backing store failed; the stale value stays in place.
    Failed,
    /// The backing store did not answer within the timeout.
    TimedOut,
}

impl RefreshOutcome {
    fn as_str(self) -> &'static str {
        match self {
            RefreshOutcome::Committed => "committed",
            RefreshOutcome::Superseded => "superseded",
            RefreshOutcome::Failed => "failed",
            RefreshOutcome::TimedOut => "timed_out",
        }
    }
}

/// Summary of [`RefreshScheduler::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub aborted: usize,
}

/// Releases the refresh marker if the task ends without settling its ticket,
/// whether by panic or by abort.
struct TicketGuard<V: Clone> {
    store: Arc<CacheStore<V>>,
    ticket: Option<RefreshTicket>,
}

impl<V: Clone> TicketGuard<V> {
    fn settle(
        &mut self,
        outcome: impl FnOnce(&CacheStore<V>, &RefreshTicket) -> RefreshOutcome,
    ) -> RefreshOutcome {
        match self.ticket.take() {
            Some(ticket) => outcome(&self.store, &ticket),
            None => RefreshOutcome::Superseded,
        }
    }
}

impl<V: Clone> Drop for TicketGuard<V> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.store.abandon_refresh(&ticket);
        }
    }
}

pub struct RefreshScheduler<V> {
    store: Arc<CacheStore<V>>,
    timeout: Duration,
    handles: Arc<DashMap<CacheKey, (u64, AbortHandle)>>,
    tasks: Mutex<JoinSet<()>>,
}

impl<V> RefreshScheduler<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<CacheStore<V>>, config: &CacheConfig) -> Self {
        Self {
            store,
            timeout: config.refresh_timeout(),
            handles: Arc::new(DashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore<V>> {
        &self.store
    }

    /// Run `refresh` in the background on behalf of `ticket`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F, E>(&self, ticket: RefreshTicket, refresh: F)
    where
        F: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let key = ticket.key().clone();
        let generation = ticket.generation();
        let timeout = self.timeout;
        let handles = Arc::clone(&self.handles);
        let mut guard = TicketGuard {
            store: Arc::clone(&self.store),
            ticket: Some(ticket),
        };
        let task_key = key.clone();

        let abort = {
            let mut tasks = mutex_lock(&self.tasks, SOURCE, "spawn");
            while tasks.try_join_next().is_some() {}

            tasks.spawn(async move {
                let started_at = Instant::now();
                let outcome = match tokio::time::timeout(timeout, refresh).await {
                    Ok(Ok(value)) => guard.settle(|store, ticket| {
                        if store.complete_refresh(ticket, value) {
                            RefreshOutcome::Committed
                        } else {
                            RefreshOutcome::Superseded
                        }
                    }),
                    Ok(Err(error)) => {
                        warn!(
                            cache_key = %task_key,
                            error = %error,
                            "background refresh failed; keeping stale entries"
                        );
                        guard.settle(|store, ticket| {
                            store.abandon_refresh(ticket);
                            RefreshOutcome::Failed
                        })
                    }
                    Err(_) => {
                        warn!(
                            cache_key = %task_key,
                            timeout_ms = timeout.as_millis() as u64,
                            "background refresh timed out; keeping stale entries"
                        );
                        guard.settle(|store, ticket| {
                            store.abandon_refresh(ticket);
                            RefreshOutcome::TimedOut
                        })
                    }
                };

                let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
                counter!(METRIC_REFRESH_TOTAL, "result" => outcome.as_str()).increment(1);
                histogram!(METRIC_REFRESH_MS).record(elapsed_ms);
                debug!(
                    cache_key = %task_key,
                    outcome = outcome.as_str(),
                    elapsed_ms,
                    "background refresh finished"
                );

                handles.remove_if(&task_key, |_, (owner, _)| *owner == generation);
            })
        };

        self.handles.insert(key.clone(), (generation, abort.clone()));
        if abort.is_finished() {
            self.handles
                .remove_if(&key, |_, (owner, _)| *owner == generation);
        }
    }

    /// Abort the refresh running for `key`, if any, and clear its marker.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        self.store.cancel_in_flight(key);
        match self.handles.remove(key) {
            Some((_, (_, handle))) => {
                handle.abort();
                debug!(cache_key = %key, "background refresh cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of refreshes that have been spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.handles.len()
    }

    /// Wait up to `grace` for in-flight refreshes, then abort the remainder.
    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        let mut tasks = std::mem::take(&mut *mutex_lock(&self.tasks, SOURCE, "shutdown"));
        let mut report = DrainReport::default();

        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {
                report.completed += 1;
            }
        })
        .await;

        if drained.is_err() {
            report.aborted = tasks.len();
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        self.handles.clear();
        info!(
            completed = report.completed,
            aborted = report.aborted,
            "refresh scheduler drained"
        );
        report
    }
}
