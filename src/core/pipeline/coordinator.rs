//! Client-driven utterance pipeline.
//!
//! The coordinator owns exactly one session at a time. A session segments
//! the utterance, feeds the chunks to the synthesis queue, releases ready
//! audio to the playback queue in chunk order and syncs video as each chunk
//! starts playing. Starting a new session disposes of the previous one
//! (timers, queued jobs, queued audio, scheduler state) before anything of
//! the new one is installed.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{PipelineConfig, SessionOptions, SyncMode};
use super::events::PipelineEvent;
use super::session::{FallbackMode, PipelineEntry, Session, SessionStatus, Stage, StageStatus};
use super::stats::{PipelineStats, StatsRegistry, global_stats};
use crate::core::events::EventBus;
use crate::core::segmenter::{SegmentError, TextSegmenter};
use crate::core::synthesis::{
    JobEvent, JobRequest, PlaybackItem, PlaybackQueue, PlaybackQueueEvent, QueueStatus,
    SynthesisJobQueue, SynthesisOutput,
};
use crate::core::timers::TimerSet;
use crate::core::video::{SchedulerStatus, SyncOptions, VideoResult, VideoSelection, VideoSyncScheduler};
use crate::utils::{get_current_time_ms, scoped_id, split_scoped_id};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Segmentation failed: {0}")]
    Segmentation(#[from] SegmentError),
    #[error("No active session")]
    NoActiveSession,
    #[error("Session '{0}' is not waiting for a manual trigger")]
    NotManual(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Point-in-time view of the coordinator and its components.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub session: Option<Session>,
    pub queue: QueueStatus,
    pub video: SchedulerStatus,
    pub playback_queued: usize,
    pub pending_timers: usize,
    pub stats: PipelineStats,
}

struct ActiveSession {
    session: Session,
    mode: SyncMode,
    options: SessionOptions,
    timers: TimerSet,
    /// Synthesized chunks waiting for their turn.
    ready: BTreeMap<usize, Arc<SynthesisOutput>>,
    next_to_queue: usize,
    next_release: usize,
    in_flight: usize,
    playback_started: bool,
}

struct CoordinatorInner {
    config: PipelineConfig,
    segmenter: TextSegmenter,
    queue: SynthesisJobQueue,
    playback: PlaybackQueue,
    scheduler: VideoSyncScheduler,
    stats: Arc<StatsRegistry>,
    events: EventBus<PipelineEvent>,
    session: Mutex<Option<ActiveSession>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

/// Runs one utterance at a time through segmentation, synthesis, playback
/// and video sync.
#[derive(Clone)]
pub struct PipelineCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl PipelineCoordinator {
    pub fn new(
        config: PipelineConfig,
        segmenter: TextSegmenter,
        queue: SynthesisJobQueue,
        playback: PlaybackQueue,
        scheduler: VideoSyncScheduler,
    ) -> Self {
        Self::with_stats(config, segmenter, queue, playback, scheduler, global_stats())
    }

    /// Like [`Self::new`] but records into `stats` instead of the global registry.
    pub fn with_stats(
        config: PipelineConfig,
        segmenter: TextSegmenter,
        queue: SynthesisJobQueue,
        playback: PlaybackQueue,
        scheduler: VideoSyncScheduler,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                segmenter,
                queue,
                playback,
                scheduler,
                stats,
                events: EventBus::new(),
                session: Mutex::new(None),
                pumps: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Tear down the current session and start a new one for `text`.
    ///
    /// Failures are reported as events, never returned: a segmentation
    /// error completes the session as failed, with the text-only fallback
    /// when `fallback_to_text` is enabled.
    pub async fn start_session(&self, text: &str, session_id: &str, options: SessionOptions) {
        let inner = &self.inner;
        inner.ensure_pumps();
        inner.teardown().await;
        inner.stats.record_started();

        let mode = options.sync_mode.unwrap_or(inner.config.sync_mode);
        let now = get_current_time_ms();

        let chunks = match inner.segmenter.try_segment(text) {
            Ok(chunks) => chunks,
            Err(e) => {
                inner.fail_session(session_id, text, now, e.into());
                return;
            }
        };

        let entries: BTreeMap<usize, PipelineEntry> = chunks
            .into_iter()
            .map(|chunk| {
                let chunk_id = scoped_id(session_id, chunk.index);
                (chunk.index, PipelineEntry::new(chunk_id, chunk, now))
            })
            .collect();
        let total_chunks = entries.len();

        info!(
            "Starting session '{}' with {} chunk(s) in {:?} mode",
            session_id, total_chunks, mode
        );

        let mut guard = inner.session.lock();
        let active = guard.insert(ActiveSession {
            session: Session {
                id: session_id.to_string(),
                utterance_text: text.to_string(),
                start_time_ms: now,
                status: SessionStatus::Starting,
                total_chunks,
                processed_chunks: 0,
                entries,
            },
            mode,
            options,
            timers: TimerSet::new("pipeline-session"),
            ready: BTreeMap::new(),
            next_to_queue: 0,
            next_release: 0,
            in_flight: 0,
            playback_started: mode != SyncMode::Buffered,
        });

        inner.events.publish(PipelineEvent::SessionStarted {
            session_id: session_id.to_string(),
            total_chunks,
            sync_mode: mode,
        });

        match mode {
            SyncMode::Realtime => {
                active.session.status = SessionStatus::Processing;
                inner.queue_chunks(active);
            }
            SyncMode::Buffered => {
                active.session.status = SessionStatus::Buffering;
                let delay_ms = inner.config.buffering_delay_ms;
                inner.events.publish(PipelineEvent::SessionBuffering {
                    session_id: session_id.to_string(),
                    delay_ms,
                });
                inner.queue_chunks(active);

                let weak: Weak<CoordinatorInner> = Arc::downgrade(inner);
                let id = session_id.to_string();
                active
                    .timers
                    .schedule(Duration::from_millis(delay_ms), async move {
                        if let Some(inner) = weak.upgrade() {
                            inner.on_buffer_elapsed(&id);
                        }
                    });
            }
            SyncMode::Manual => {
                active.session.status = SessionStatus::Ready;
            }
        }

        inner.maybe_finish(active);
    }

    /// Tear down the current session and return the video to idle.
    ///
    /// Returns the id of the session that was stopped, if one was running.
    pub async fn stop_session(&self) -> Option<String> {
        let inner = &self.inner;
        let stopped = inner.teardown().await;
        let stopped_id = stopped.as_ref().and_then(|active| {
            (active.session.status == SessionStatus::Stopped).then(|| active.session.id.clone())
        });
        // Keep the disposed session around for status snapshots.
        *inner.session.lock() = stopped;

        if let Err(e) = inner.scheduler.return_to_idle().await {
            warn!("Failed to return to idle after stopping session: {}", e);
        }
        stopped_id
    }

    /// Queue every chunk of a session started in manual mode.
    ///
    /// Returns the number of chunks queued.
    pub fn trigger_manual(&self) -> PipelineResult<usize> {
        let mut guard = self.inner.session.lock();
        let active = guard
            .as_mut()
            .filter(|active| !active.session.status.is_terminal())
            .ok_or(PipelineError::NoActiveSession)?;

        if active.mode != SyncMode::Manual || active.session.status != SessionStatus::Ready {
            return Err(PipelineError::NotManual(active.session.id.clone()));
        }

        info!("Manual trigger for session '{}'", active.session.id);
        active.session.status = SessionStatus::Processing;
        let before = active.next_to_queue;
        self.inner.queue_chunks(active);
        Ok(active.next_to_queue - before)
    }

    /// Id of the session that is still in progress.
    pub fn active_session_id(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .as_ref()
            .filter(|active| !active.session.status.is_terminal())
            .map(|active| active.session.id.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// Timers held by the session plus the video scheduler.
    pub fn pending_timers(&self) -> usize {
        let session_timers = self
            .inner
            .session
            .lock()
            .as_ref()
            .map_or(0, |active| active.timers.pending());
        session_timers + self.inner.scheduler.pending_timers()
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            session: self.session(),
            queue: self.inner.queue.status(),
            video: self.inner.scheduler.status(),
            playback_queued: self.inner.playback.len(),
            pending_timers: self.pending_timers(),
            stats: self.inner.stats.snapshot(),
        }
    }
}

impl CoordinatorInner {
    fn ensure_pumps(self: &Arc<Self>) {
        let mut pumps = self.pumps.lock();
        if !pumps.is_empty() {
            return;
        }

        let mut jobs = self.queue.subscribe();
        let weak = Arc::downgrade(self);
        pumps.push(tokio::spawn(async move {
            while let Some(event) = jobs.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.on_job_event(event);
            }
        }));

        let mut playback = self.playback.subscribe();
        let weak = Arc::downgrade(self);
        pumps.push(tokio::spawn(async move {
            while let Some(event) = playback.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.on_playback_event(event);
            }
        }));
    }

    /// Dispose of the current session. Returns it, marked stopped if it was
    /// still running.
    async fn teardown(&self) -> Option<ActiveSession> {
        let previous = self.session.lock().take();
        // Abort in-flight video syncs before anything below yields.
        if let Some(active) = &previous {
            active.timers.clear();
        }
        self.scheduler.cancel();
        let dropped_jobs = self.queue.clear();
        self.playback.clear().await;

        let mut active = previous?;
        active.ready.clear();
        if !active.session.status.is_terminal() {
            active.session.status = SessionStatus::Stopped;
            info!(
                "Stopped session '{}' ({} job(s) dropped)",
                active.session.id, dropped_jobs
            );
            self.events.publish(PipelineEvent::SessionStopped {
                session_id: active.session.id.clone(),
            });
        }
        Some(active)
    }

    /// Session-level failure before any chunk exists.
    fn fail_session(&self, session_id: &str, text: &str, now: u64, error: PipelineError) {
        warn!("Session '{}' failed during setup: {}", session_id, error);
        self.events.publish(PipelineEvent::Error {
            session_id: session_id.to_string(),
            chunk_index: None,
            error: error.to_string(),
        });

        *self.session.lock() = Some(ActiveSession {
            session: Session {
                id: session_id.to_string(),
                utterance_text: text.to_string(),
                start_time_ms: now,
                status: SessionStatus::Failed,
                total_chunks: 0,
                processed_chunks: 0,
                entries: BTreeMap::new(),
            },
            mode: SyncMode::Realtime,
            options: SessionOptions::default(),
            timers: TimerSet::new("pipeline-session"),
            ready: BTreeMap::new(),
            next_to_queue: 0,
            next_release: 0,
            in_flight: 0,
            playback_started: false,
        });

        self.stats.record_finished(false, 0, 0);
        self.events.publish(PipelineEvent::SessionCompleted {
            session_id: session_id.to_string(),
            status: SessionStatus::Failed,
            fallback_mode: self.config.fallback_to_text.then_some(FallbackMode::TextOnly),
            processing_time_ms: 0,
            failed_chunks: 0,
        });
    }

    fn mark(
        &self,
        active: &mut ActiveSession,
        index: usize,
        stage: Stage,
        status: StageStatus,
        detail: Option<String>,
    ) {
        let Some(entry) = active.session.entries.get_mut(&index) else {
            return;
        };
        entry.set(stage, status, detail, get_current_time_ms());
        self.events.publish(PipelineEvent::ChunkProgress {
            session_id: active.session.id.clone(),
            chunk_index: index,
            stage,
            status,
        });
    }

    /// Queue chunks up to the mode's window. Buffered sessions keep at most
    /// `max_concurrent_chunks` in synthesis; the other modes queue all.
    fn queue_chunks(&self, active: &mut ActiveSession) {
        let window = match active.mode {
            SyncMode::Buffered => self.config.max_concurrent_chunks.max(1),
            SyncMode::Realtime | SyncMode::Manual => usize::MAX,
        };

        let mut requests = Vec::new();
        let mut indices = Vec::new();
        while active.next_to_queue < active.session.total_chunks && active.in_flight < window {
            let index = active.next_to_queue;
            active.next_to_queue += 1;
            let Some(entry) = active.session.entries.get(&index) else {
                continue;
            };
            active.in_flight += 1;
            requests.push(JobRequest {
                id: entry.chunk_id.clone(),
                text: entry.chunk.text.clone(),
                options: active.options.synthesis.clone(),
                priority: index as i64,
            });
            indices.push(index);
        }
        if requests.is_empty() {
            return;
        }

        for index in indices {
            self.mark(active, index, Stage::TtsQueued, StageStatus::Completed, None);
            self.mark(active, index, Stage::TtsCompleted, StageStatus::Processing, None);
        }
        debug!(
            "Session '{}' queued {} chunk(s) for synthesis",
            active.session.id,
            requests.len()
        );
        self.queue.enqueue_batch(requests);
    }

    /// The active session if `session_id` names it and it is still running.
    fn live<'a>(
        guard: &'a mut Option<ActiveSession>,
        session_id: &str,
    ) -> Option<&'a mut ActiveSession> {
        guard
            .as_mut()
            .filter(|active| active.session.id == session_id && !active.session.status.is_terminal())
    }

    fn on_job_event(&self, event: JobEvent) {
        let job_id = event.job_id().to_string();
        let Some((session_id, index)) = split_scoped_id(&job_id) else {
            warn!("Ignoring job event with unrecognized id '{}'", job_id);
            return;
        };
        let mut guard = self.session.lock();
        let Some(active) = Self::live(&mut guard, session_id) else {
            debug!("Ignoring stale job event for '{}'", job_id);
            return;
        };

        match event {
            JobEvent::Completed {
                output, from_cache, ..
            } => {
                if let Some(entry) = active.session.entries.get_mut(&index) {
                    entry.audio_duration_ms = Some(output.duration_ms());
                }
                let detail = from_cache.then(|| "cache".to_string());
                self.mark(active, index, Stage::TtsCompleted, StageStatus::Completed, detail);
                active.ready.insert(index, output);
                self.settle_chunk(active);
            }
            JobEvent::Retrying { attempt, error, .. } => {
                debug!("Chunk '{}' retrying (attempt {}): {}", job_id, attempt, error);
            }
            JobEvent::Failed {
                error, attempts, ..
            } => {
                warn!(
                    "Chunk '{}' failed after {} attempt(s): {}",
                    job_id, attempts, error
                );
                self.mark(
                    active,
                    index,
                    Stage::TtsCompleted,
                    StageStatus::Failed,
                    Some(error.clone()),
                );
                self.events.publish(PipelineEvent::Error {
                    session_id: session_id.to_string(),
                    chunk_index: Some(index),
                    error,
                });
                self.settle_chunk(active);
            }
        }
    }

    fn settle_chunk(&self, active: &mut ActiveSession) {
        active.session.processed_chunks += 1;
        active.in_flight = active.in_flight.saturating_sub(1);
        if active.session.status != SessionStatus::Ready {
            self.queue_chunks(active);
        }
        self.release_ready(active);
        self.maybe_finish(active);
    }

    /// Release settled chunks in order, stopping at the first one still in
    /// synthesis.
    fn release_ready(&self, active: &mut ActiveSession) {
        if !active.playback_started {
            return;
        }

        while active.next_release < active.session.total_chunks {
            let index = active.next_release;
            let Some(entry) = active.session.entries.get(&index) else {
                active.next_release += 1;
                continue;
            };
            let chunk_id = entry.chunk_id.clone();
            let text = entry.chunk.text.clone();
            let estimate_ms = entry.chunk.estimated_duration_ms;
            let audio_failed = entry.audio_failed();

            if let Some(output) = active.ready.remove(&index) {
                self.events.publish(PipelineEvent::ChunkDisplay {
                    session_id: active.session.id.clone(),
                    chunk_index: index,
                    text,
                    display_duration_ms: output.duration_ms(),
                    has_audio: true,
                });
                self.playback.add_to_playback_queue(PlaybackItem {
                    id: chunk_id,
                    source: output.audio.source.clone(),
                    duration_secs: output.duration_secs,
                });
                if !self.config.enable_video_sync {
                    self.mark(
                        active,
                        index,
                        Stage::VideoSynced,
                        StageStatus::Completed,
                        Some("disabled".to_string()),
                    );
                }
            } else if audio_failed {
                self.events.publish(PipelineEvent::ChunkDisplay {
                    session_id: active.session.id.clone(),
                    chunk_index: index,
                    text,
                    display_duration_ms: estimate_ms,
                    has_audio: false,
                });
                self.mark(
                    active,
                    index,
                    Stage::VideoSynced,
                    StageStatus::Failed,
                    Some("no audio".to_string()),
                );
            } else {
                break;
            }
            active.next_release += 1;
        }
    }

    fn on_buffer_elapsed(&self, session_id: &str) {
        let mut guard = self.session.lock();
        let Some(active) = Self::live(&mut guard, session_id) else {
            return;
        };
        debug!("Buffering delay elapsed for session '{}'", session_id);
        active.playback_started = true;
        active.session.status = SessionStatus::Processing;
        self.release_ready(active);
        self.maybe_finish(active);
    }

    fn on_playback_event(self: &Arc<Self>, event: PlaybackQueueEvent) {
        match event {
            PlaybackQueueEvent::Started {
                item_id,
                duration_secs,
            } => {
                if self.config.enable_video_sync {
                    self.start_video_sync(&item_id, duration_secs);
                }
            }
            PlaybackQueueEvent::Ended { item_id } => {
                debug!("Chunk '{}' finished playing", item_id);
            }
            PlaybackQueueEvent::Error { item_id, error } => {
                let Some((session_id, index)) = split_scoped_id(&item_id) else {
                    return;
                };
                let mut guard = self.session.lock();
                let Some(active) = Self::live(&mut guard, session_id) else {
                    return;
                };
                self.mark(
                    active,
                    index,
                    Stage::VideoSynced,
                    StageStatus::Failed,
                    Some(format!("playback failed: {error}")),
                );
                self.events.publish(PipelineEvent::Error {
                    session_id: session_id.to_string(),
                    chunk_index: Some(index),
                    error,
                });
                self.maybe_finish(active);
            }
        }
    }

    /// Sync video for the chunk that just started playing.
    fn start_video_sync(self: &Arc<Self>, item_id: &str, duration_secs: f64) {
        let Some((session_id, index)) = split_scoped_id(item_id) else {
            return;
        };
        let mut guard = self.session.lock();
        let Some(active) = Self::live(&mut guard, session_id) else {
            return;
        };
        let Some(text) = active
            .session
            .entries
            .get(&index)
            .map(|entry| entry.chunk.text.clone())
        else {
            return;
        };

        self.mark(active, index, Stage::VideoSynced, StageStatus::Processing, None);

        let weak = Arc::downgrade(self);
        let session_id = session_id.to_string();
        let chunk_id = item_id.to_string();
        let options = SyncOptions {
            emotion_hint: active.options.emotion_hint,
            skip_idle_return: false,
        };
        active.timers.spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let result = inner
                .scheduler
                .sync(&text, duration_secs, &chunk_id, options)
                .await;
            inner.on_video_synced(&session_id, index, result);
        });
    }

    fn on_video_synced(&self, session_id: &str, index: usize, result: VideoResult<VideoSelection>) {
        let mut guard = self.session.lock();
        let Some(active) = Self::live(&mut guard, session_id) else {
            return;
        };
        match result {
            Ok(selection) => {
                self.mark(active, index, Stage::VideoSynced, StageStatus::Completed, None);
                self.events.publish(PipelineEvent::VideoChanged {
                    session_id: session_id.to_string(),
                    chunk_index: index,
                    selection,
                });
            }
            Err(e) => {
                warn!(
                    "Video sync failed for chunk {} of session '{}': {}",
                    index, session_id, e
                );
                self.mark(
                    active,
                    index,
                    Stage::VideoSynced,
                    StageStatus::Failed,
                    Some(e.to_string()),
                );
            }
        }
        self.maybe_finish(active);
    }

    /// Complete the session once every stage of every entry is terminal.
    fn maybe_finish(&self, active: &mut ActiveSession) {
        if active.session.status.is_terminal() || !active.session.is_complete() {
            return;
        }

        let processing_time_ms = get_current_time_ms().saturating_sub(active.session.start_time_ms);
        let failed = active.session.all_audio_failed();
        let status = if failed {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        };
        active.session.status = status;
        // May abort the calling sync task; it has no await left.
        active.timers.clear();

        let failed_chunks = active.session.failed_chunks();
        let fallback_mode =
            (failed && self.config.fallback_to_text).then_some(FallbackMode::TextOnly);
        self.stats
            .record_finished(!failed, processing_time_ms, active.session.total_chunks);

        info!(
            "Session '{}' {:?} in {} ms ({} of {} chunk(s) failed)",
            active.session.id, status, processing_time_ms, failed_chunks, active.session.total_chunks
        );
        self.events.publish(PipelineEvent::SessionCompleted {
            session_id: active.session.id.clone(),
            status,
            fallback_mode,
            processing_time_ms,
            failed_chunks,
        });
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        for handle in self.pumps.lock().drain(..) {
            handle.abort();
        }
    }
}
