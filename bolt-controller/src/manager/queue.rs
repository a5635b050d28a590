//! Work queue
//!
//! Deduplicating queue of object names awaiting reconciliation. A name is
//! handed out to at most one worker at a time; if it is enqueued again while
//! a worker holds it, it is re-queued once that worker calls [`WorkQueue::done`].

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct QueueState {
    /// Waiting names, in arrival order
    queue: VecDeque<String>,
    /// Names currently in `queue`
    queued: HashSet<String>,
    /// Names held by a worker
    active: HashSet<String>,
    /// Active names enqueued again while being processed
    dirty: HashSet<String>,
}

#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `name` unless it is already waiting
    pub fn enqueue(&self, name: &str) {
        let mut state = self.state();

        if state.active.contains(name) {
            state.dirty.insert(name.to_string());
            return;
        }

        if state.queued.insert(name.to_string()) {
            state.queue.push_back(name.to_string());
            self.notify.notify_one();
        }
    }

    /// Waits for the next name and marks it active
    ///
    /// Returns `None` once `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<String> {
        loop {
            {
                let mut state = self.state();
                if let Some(name) = state.queue.pop_front() {
                    state.queued.remove(&name);
                    state.active.insert(name.clone());
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(name);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Releases `name`, re-queueing it if it was enqueued while active
    pub fn done(&self, name: &str) {
        let requeue = {
            let mut state = self.state();
            state.active.remove(name);
            state.dirty.remove(name)
        };

        if requeue {
            self.enqueue(name);
        }
    }

    /// Number of names waiting
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a worker currently holds `name`
    pub fn is_active(&self, name: &str) -> bool {
        self.state().active.contains(name)
    }
}
