//! Watch and wait primitives
//!
//! Turns the cluster's watch streams into lazy, cancellable sequences of
//! typed objects, and builds "wait until this object satisfies a predicate"
//! on top of them. Waiting is the only place where observation suspends;
//! every wait is bounded by a [`CancellationToken`] and drops its watch
//! subscription as soon as it returns.

use bolt_core::domain::meta::Resource;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{Api, WatchEvent};
use crate::error::{ClusterError, WaitError};
use crate::params::ListParams;

/// Pause before re-opening a watch the server closed
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

impl<K: Resource> Api<K> {
    /// Observes objects matching `params`
    ///
    /// The sequence starts with the current state of every matching object
    /// and continues with every later change. It ends when the server closes
    /// the watch, when the watch fails, or when `cancel` fires. Dropping it
    /// releases the subscription.
    pub fn watch(&self, cancel: &CancellationToken, params: ListParams) -> BoxStream<'static, K> {
        let api = self.clone();
        let cancel = cancel.clone();

        async_stream::stream! {
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                opened = api.watch_events(&params, None) => opened,
            };

            let events = match opened {
                Ok(events) => events,
                Err(e) => {
                    warn!("Failed to watch {}: {}", K::KIND.kind, e);
                    return;
                }
            };

            let mut objects = objects(events, cancel);
            while let Some(object) = objects.next().await {
                yield object;
            }
        }
        .boxed()
    }

    /// Observes the single object called `name`
    pub fn watch_single(&self, cancel: &CancellationToken, name: &str) -> BoxStream<'static, K> {
        self.watch(cancel, ListParams::name(name))
    }

    /// Waits until the object called `name` satisfies `predicate`
    ///
    /// Consumes the same sequence as [`Api::watch_single`], so the current
    /// state is checked first. If the server closes the watch the wait
    /// re-subscribes; only a failure to open the first watch is reported as
    /// a cluster error.
    ///
    /// # Returns
    /// The first observed version of the object satisfying `predicate`, or
    /// [`WaitError::Cancelled`] once `cancel` fires.
    pub async fn wait_for_condition<P>(
        &self,
        cancel: &CancellationToken,
        name: &str,
        predicate: P,
    ) -> Result<K, WaitError>
    where
        P: Fn(&K) -> bool,
    {
        let params = ListParams::name(name);
        let cancelled = || WaitError::Cancelled {
            name: name.to_string(),
        };
        let mut subscribed = false;

        loop {
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                opened = self.watch_events(&params, None) => opened,
            };

            match opened {
                Ok(events) => {
                    subscribed = true;
                    let mut objects = objects(events, cancel.clone());
                    while let Some(object) = objects.next().await {
                        if predicate(&object) {
                            return Ok(object);
                        }
                    }
                }
                Err(e) if !subscribed => return Err(e.into()),
                Err(e) => warn!("Re-watching {} '{}' failed: {}", K::KIND.kind, name, e),
            }

            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            debug!("Watch on {} '{}' closed, re-subscribing", K::KIND.kind, name);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
    }

    /// Waits at most `timeout` for the object called `name` to satisfy `predicate`
    ///
    /// Runs the wait under a child of `cancel`, so cancelling `cancel` still
    /// ends it early. On timeout the watch is torn down before returning.
    pub async fn wait_for_condition_with_timeout<P>(
        &self,
        cancel: &CancellationToken,
        name: &str,
        predicate: P,
        timeout: Duration,
    ) -> Result<K, WaitError>
    where
        P: Fn(&K) -> bool,
    {
        let child = cancel.child_token();

        match tokio::time::timeout(timeout, self.wait_for_condition(&child, name, predicate)).await {
            Ok(result) => result,
            Err(_) => {
                child.cancel();
                Err(WaitError::TimedOut {
                    name: name.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Checks `predicate` once against the current state of `name`
    ///
    /// A missing object does not satisfy any condition.
    pub async fn is_condition<P>(&self, name: &str, predicate: P) -> Result<bool, ClusterError>
    where
        P: Fn(&K) -> bool,
    {
        Ok(self.get_opt(name).await?.is_some_and(|object| predicate(&object)))
    }
}

/// Objects carried by a watch stream, until it ends, fails or is cancelled
fn objects<K: Resource>(
    mut events: BoxStream<'static, crate::error::Result<WatchEvent<K>>>,
    cancel: CancellationToken,
) -> BoxStream<'static, K> {
    async_stream::stream! {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    if let Some(object) = event.into_object() {
                        yield object;
                    }
                }
                Some(Err(e)) => {
                    debug!("Watch on {} ended: {}", K::KIND.kind, e);
                    break;
                }
                None => break,
            }
        }
    }
    .boxed()
}
