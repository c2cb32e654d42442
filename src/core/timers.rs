//! Tracked timer tasks.
//!
//! Every delayed action in the engine (idle returns, buffering delays,
//! per-chunk video sync tasks) is spawned through a [`TimerSet`] owned by the
//! session, slot or scheduler that scheduled it. Tearing the owner down calls
//! [`TimerSet::clear`], which aborts everything still pending, and
//! [`TimerSet::pending`] lets tests assert that nothing leaked.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identifier of a scheduled timer within its [`TimerSet`].
pub type TimerId = u64;

type HandleMap = Mutex<HashMap<TimerId, JoinHandle<()>>>;

/// Removes a timer from its set when the task future is dropped, whether it
/// ran to completion or was aborted.
struct Registration {
    handles: Weak<HandleMap>,
    id: TimerId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(handles) = self.handles.upgrade() {
            handles.lock().remove(&self.id);
        }
    }
}

/// A disposable collection of spawned timer tasks.
pub struct TimerSet {
    label: &'static str,
    next_id: AtomicU64,
    handles: Arc<HandleMap>,
}

impl TimerSet {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            next_id: AtomicU64::new(1),
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `task` after `delay` unless the timer is cancelled first.
    ///
    /// The timer counts as pending until the task finishes, so [`clear`]
    /// also aborts a task that is already running. Must be called from
    /// within a tokio runtime.
    ///
    /// [`clear`]: TimerSet::clear
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            handles: Arc::downgrade(&self.handles),
            id,
        };

        // Insert while holding the lock so the task cannot deregister itself
        // before it has been registered.
        let mut guard = self.handles.lock();
        let handle = tokio::spawn(async move {
            let _registration = registration;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });
        guard.insert(id, handle);
        id
    }

    /// Spawn a tracked task that starts immediately.
    pub fn spawn<F>(&self, task: F) -> TimerId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule(Duration::ZERO, task)
    }

    /// Cancel a single timer. Returns `false` if it already finished.
    pub fn cancel(&self, id: TimerId) -> bool {
        // Aborting may drop the task inline, which takes the lock again.
        let removed = self.handles.lock().remove(&id);
        match removed {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every pending or running timer and return how many were aborted.
    pub fn clear(&self) -> usize {
        let drained: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock();
            guard.drain().map(|(_, handle)| handle).collect()
        };
        let count = drained.len();
        for handle in drained {
            handle.abort();
        }
        if count > 0 {
            debug!("Cleared {} pending timer(s) from '{}'", count, self.label);
        }
        count
    }

    /// Number of timers that have not finished or been cancelled yet.
    pub fn pending(&self) -> usize {
        self.handles.lock().len()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        let drained: Vec<JoinHandle<()>> =
            self.handles.lock().drain().map(|(_, handle)| handle).collect();
        for handle in drained {
            handle.abort();
        }
    }
}
