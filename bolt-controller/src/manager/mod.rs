//! Controller manager
//!
//! Drives one [`Reconciler`]: watches its primary and secondary kinds,
//! feeds the names of affected primaries into a [`WorkQueue`], and runs
//! reconciliations from that queue.
//!
//! - Reconciliation is level-triggered: every watch event, periodic resync
//!   or retry only enqueues a name, and the reconciler recomputes
//!   everything from the current state.
//! - A name is reconciled by at most one worker at a time, different
//!   names run concurrently up to a configured limit.
//! - Failures are retried with per-name exponential backoff.

mod backoff;
pub mod queue;

use bolt_client::{Api, ListParams};
use bolt_core::domain::meta::Resource;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::controller::{Context, Reconciler};

pub use backoff::Backoff;
pub use queue::WorkQueue;

/// Pause before re-opening a watch the server closed
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Tuning of the reconciliation loop
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub max_concurrent_reconciles: usize,
    pub resync_interval: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl From<&Config> for ManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrent_reconciles: config.max_concurrent_reconciles,
            resync_interval: config.resync_interval,
            retry_base_delay: config.retry_base_delay,
            retry_max_delay: config.retry_max_delay,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Runs one controller until cancelled
pub struct Manager<R: Reconciler> {
    reconciler: Arc<R>,
    primaries: Api<R::Primary>,
    secondaries: Api<R::Secondary>,
    queue: Arc<WorkQueue>,
    semaphore: Arc<Semaphore>,
    backoff: Arc<Backoff>,
    resync_interval: Duration,
}

impl<R: Reconciler> Manager<R> {
    pub fn new(reconciler: R, context: &Context, settings: ManagerSettings) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            primaries: Api::namespaced(context.client.clone(), &context.namespace),
            secondaries: Api::namespaced(context.client.clone(), &context.namespace),
            queue: Arc::new(WorkQueue::new()),
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent_reconciles)),
            backoff: Arc::new(Backoff::new(
                settings.retry_base_delay,
                settings.retry_max_delay,
            )),
            resync_interval: settings.resync_interval,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Starts the watch, resync and worker loops
    ///
    /// Returns after `cancel` fires and every running reconciliation has
    /// finished.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting {} controller (max concurrent reconciles: {}, resync: {:?})",
            R::NAME,
            self.semaphore.available_permits(),
            self.resync_interval
        );

        tokio::join!(
            self.watch_primaries(&cancel),
            self.watch_secondaries(&cancel),
            self.resync(&cancel),
            self.dispatch(&cancel),
        );

        info!("Stopped {} controller", R::NAME);
    }

    // =============================================================================
    // Event sources
    // =============================================================================

    async fn watch_primaries(&self, cancel: &CancellationToken) {
        let queue = Arc::clone(&self.queue);
        watch_loop(&self.primaries, cancel, |primary: R::Primary| {
            queue.enqueue(primary.name());
        })
        .await
    }

    async fn watch_secondaries(&self, cancel: &CancellationToken) {
        let queue = Arc::clone(&self.queue);
        let reconciler = Arc::clone(&self.reconciler);
        watch_loop(&self.secondaries, cancel, |secondary: R::Secondary| {
            for name in reconciler.primaries_for(&secondary) {
                debug!(
                    "{} {} changed, re-queueing {}",
                    <R::Secondary as Resource>::KIND.kind,
                    secondary.name(),
                    name
                );
                queue.enqueue(&name);
            }
        })
        .await
    }

    /// Enqueues every primary once per resync interval
    async fn resync(&self, cancel: &CancellationToken) {
        let mut interval = time::interval_at(
            Instant::now() + self.resync_interval,
            self.resync_interval,
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }

            match self.primaries.list(&ListParams::default()).await {
                Ok(primaries) => {
                    debug!("Resyncing {} {} object(s)", primaries.len(), R::NAME);
                    for primary in &primaries {
                        self.queue.enqueue(primary.name());
                    }
                }
                Err(e) => warn!("Failed to list {} objects for resync: {}", R::NAME, e),
            }
        }
    }

    // =============================================================================
    // Workers
    // =============================================================================

    async fn dispatch(&self, cancel: &CancellationToken) {
        let mut in_flight = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(name) = self.queue.next(cancel).await else {
                break;
            };

            in_flight.spawn(self.worker(cancel).process(name, permit));

            while let Some(result) = in_flight.try_join_next() {
                if let Err(e) = result {
                    warn!("{} reconciliation task panicked: {}", R::NAME, e);
                }
            }
        }

        debug!("Waiting for {} running {} reconciliation(s)", in_flight.len(), R::NAME);
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                warn!("{} reconciliation task panicked: {}", R::NAME, e);
            }
        }
    }

    fn worker(&self, cancel: &CancellationToken) -> Worker<R> {
        Worker {
            reconciler: Arc::clone(&self.reconciler),
            queue: Arc::clone(&self.queue),
            backoff: Arc::clone(&self.backoff),
            cancel: cancel.clone(),
        }
    }
}

struct Worker<R> {
    reconciler: Arc<R>,
    queue: Arc<WorkQueue>,
    backoff: Arc<Backoff>,
    cancel: CancellationToken,
}

impl<R: Reconciler> Worker<R> {
    async fn process(self, name: String, _permit: OwnedSemaphorePermit) {
        debug!("Reconciling {} {}", R::NAME, name);

        match self.reconciler.reconcile(&name).await {
            Ok(()) => {
                self.backoff.reset(&name);
                self.queue.done(&name);
            }
            Err(e) => {
                let delay = self.backoff.next_delay(&name);
                error!(
                    "Failed to reconcile {} {}: {} (retrying in {:?})",
                    R::NAME,
                    name,
                    e,
                    delay
                );
                self.queue.done(&name);
                self.retry_after(name, delay);
            }
        }
        // Permit is released when dropped
    }

    fn retry_after(&self, name: String, delay: Duration) {
        let queue = Arc::clone(&self.queue);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = time::sleep(delay) => queue.enqueue(&name),
            }
        });
    }
}

/// Feeds every object seen on a watch of `api` to `on_object`, re-opening
/// the watch whenever the server closes it
async fn watch_loop<K: Resource>(
    api: &Api<K>,
    cancel: &CancellationToken,
    on_object: impl Fn(K),
) {
    while !cancel.is_cancelled() {
        let mut objects = api.watch(cancel, ListParams::default());
        while let Some(object) = objects.next().await {
            on_object(object);
        }

        if cancel.is_cancelled() {
            break;
        }

        debug!("Watch on {} closed, re-subscribing", K::KIND.kind);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = time::sleep(RESUBSCRIBE_DELAY) => {}
        }
    }
}
