//! Strict FIFO audio playback.
//!
//! Items play one at a time in insertion order regardless of the order in
//! which their synthesis finished. The worker advances only after the
//! current item's playback has ended (its duration elapsed) or errored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::events::EventBus;
use crate::core::media::{AudioSink, AudioSource};

/// A ready-to-play audio item.
#[derive(Debug, Clone)]
pub struct PlaybackItem {
    pub id: String,
    pub source: AudioSource,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackQueueEvent {
    Started { item_id: String, duration_secs: f64 },
    Ended { item_id: String },
    Error { item_id: String, error: String },
}

struct PlaybackInner {
    sink: Arc<dyn AudioSink>,
    items: Mutex<VecDeque<PlaybackItem>>,
    current: Mutex<Option<String>>,
    notify: Notify,
    events: EventBus<PlaybackQueueEvent>,
}

/// Owns the worker task; the worker itself only holds [`PlaybackInner`].
struct PlaybackWorker {
    task: Mutex<Option<JoinHandle<()>>>,
    cancel_token: Mutex<CancellationToken>,
}

/// Serializes audio playback through one sink.
///
/// Clones share the same queue and worker. The worker stops once the last
/// handle is dropped.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<PlaybackInner>,
    worker: Arc<PlaybackWorker>,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            inner: Arc::new(PlaybackInner {
                sink,
                items: Mutex::new(VecDeque::new()),
                current: Mutex::new(None),
                notify: Notify::new(),
                events: EventBus::new(),
            }),
            worker: Arc::new(PlaybackWorker {
                task: Mutex::new(None),
                cancel_token: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PlaybackQueueEvent> {
        self.inner.events.subscribe()
    }

    /// Append an item. Must be called from within a tokio runtime.
    pub fn add_to_playback_queue(&self, item: PlaybackItem) {
        debug!("Queued playback item '{}'", item.id);
        self.inner.items.lock().push_back(item);
        self.ensure_worker();
        self.inner.notify.notify_one();
    }

    /// Number of items waiting, not counting the one playing.
    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of the item currently playing.
    pub fn current(&self) -> Option<String> {
        self.inner.current.lock().clone()
    }

    /// Stop playback, drop queued items and stop the worker.
    pub async fn clear(&self) {
        let was_playing = self.clear_queue();
        if was_playing {
            self.inner.sink.pause().await;
            self.inner.sink.set_current_time(0.0).await;
        }
    }

    /// Synchronous part of [`Self::clear`]. Returns whether an item was
    /// playing; the caller is responsible for pausing the sink.
    pub fn clear_queue(&self) -> bool {
        if let Some(handle) = self.worker.task.lock().take() {
            handle.abort();
        }
        {
            let mut token = self.worker.cancel_token.lock();
            token.cancel();
            *token = CancellationToken::new();
        }
        self.inner.items.lock().clear();
        let was_playing = self.inner.current.lock().take().is_some();
        debug!("Cleared playback queue (was_playing={})", was_playing);
        was_playing
    }

    fn ensure_worker(&self) {
        let mut task_guard = self.worker.task.lock();
        if task_guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let inner = self.inner.clone();
        let token = self.worker.cancel_token.lock().clone();

        let handle = tokio::spawn(async move {
            debug!("Playback worker started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Playback worker cancelled");
                        break;
                    }
                    _ = inner.play_next() => {}
                }
            }
        });

        *task_guard = Some(handle);
    }
}

impl PlaybackInner {
    async fn play_next(&self) {
        let item = self.items.lock().pop_front();
        let Some(item) = item else {
            self.notify.notified().await;
            return;
        };

        let secs = if item.duration_secs.is_finite() {
            item.duration_secs.max(0.0)
        } else {
            0.0
        };
        let length = match Duration::try_from_secs_f64(secs) {
            Ok(length) => length,
            Err(e) => {
                warn!("Skipping '{}': duration {}s is out of range", item.id, secs);
                self.events.publish(PlaybackQueueEvent::Error {
                    item_id: item.id,
                    error: e.to_string(),
                });
                return;
            }
        };

        *self.current.lock() = Some(item.id.clone());

        match self.sink.play(&item.source).await {
            Ok(()) => {
                self.events.publish(PlaybackQueueEvent::Started {
                    item_id: item.id.clone(),
                    duration_secs: item.duration_secs,
                });
                tokio::time::sleep(length).await;
                self.events.publish(PlaybackQueueEvent::Ended { item_id: item.id });
            }
            Err(e) => {
                warn!("Playback of '{}' failed: {}", item.id, e);
                self.events.publish(PlaybackQueueEvent::Error {
                    item_id: item.id,
                    error: e.to_string(),
                });
            }
        }

        *self.current.lock() = None;
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.cancel_token.lock().cancel();
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}
