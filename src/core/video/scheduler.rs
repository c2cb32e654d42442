//! Video clip selection and transition scheduling.
//!
//! A sync call picks a clip for the utterance (emotion, then talk, then
//! idle), switches the actuator to it and schedules the return to idle once
//! the audio is over. A newer sync supersedes an older one: its idle-return
//! timer is cleared and any transition it still has in flight is ignored.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::emotion::{Emotion, EmotionDetector, EmotionLexicon};
use super::library::{ClipCategory, ClipLibrary, VideoSelection};
use super::lipsync::{self, LipSyncStrategy};
use crate::core::events::EventBus;
use crate::core::media::{MediaError, VideoActuator};
use crate::core::timers::TimerSet;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VideoError {
    #[error("Video actuator failed for clip '{clip_id}': {source}")]
    Actuator {
        clip_id: String,
        #[source]
        source: MediaError,
    },
    #[error("No idle clips configured")]
    NoIdleClip,
}

pub type VideoResult<T> = Result<T, VideoError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSyncConfig {
    pub min_talking_duration_secs: f64,
    pub max_talking_duration_secs: f64,
    /// Extra time after the audio ends before returning to idle.
    pub transition_buffer_ms: u64,
    pub enable_lip_sync: bool,
    pub lip_sync_strategy: LipSyncStrategy,
    /// Fixed seed for clip choice; random when unset.
    pub random_seed: Option<u64>,
}

impl Default for VideoSyncConfig {
    fn default() -> Self {
        Self {
            min_talking_duration_secs: 1.0,
            max_talking_duration_secs: 30.0,
            transition_buffer_ms: 500,
            enable_lip_sync: true,
            lip_sync_strategy: LipSyncStrategy::Simple,
            random_seed: None,
        }
    }
}

/// Per-call options for [`VideoSyncScheduler::sync`].
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Use this emotion instead of scoring the text.
    pub emotion_hint: Option<Emotion>,
    /// Leave the selected clip on screen instead of scheduling an idle return.
    pub skip_idle_return: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoState {
    Idle,
    Talking,
    Emotion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoEvent {
    EmotionDetected {
        sync_id: String,
        emotion: Emotion,
    },
    VideoChanged {
        sync_id: String,
        selection: VideoSelection,
    },
    ReturnedToIdle {
        sync_id: Option<String>,
        clip_id: String,
    },
    SyncFailed {
        sync_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: VideoState,
    pub current_clip: Option<String>,
    pub active_sync_id: Option<String>,
    pub completed_syncs: u64,
    pub failed_syncs: u64,
    pub pending_timers: usize,
}

struct SchedulerState {
    state: VideoState,
    current_clip: Option<String>,
    active_sync: Option<String>,
    /// Bumped whenever a sync starts or is cancelled.
    generation: u64,
    completed: u64,
    failed: u64,
}

struct SchedulerInner {
    config: VideoSyncConfig,
    library: ClipLibrary,
    detector: EmotionDetector,
    actuator: Arc<dyn VideoActuator>,
    rng: Mutex<StdRng>,
    state: Mutex<SchedulerState>,
    timers: TimerSet,
    events: EventBus<VideoEvent>,
    /// Held across each actuator call so a newer transition always lands last.
    transition: tokio::sync::Mutex<()>,
}

/// Maps utterances to clips and drives the idle/talk state machine.
#[derive(Clone)]
pub struct VideoSyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl VideoSyncScheduler {
    pub fn new(
        config: VideoSyncConfig,
        library: ClipLibrary,
        lexicon: &EmotionLexicon,
        actuator: Arc<dyn VideoActuator>,
    ) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                library,
                detector: EmotionDetector::new(lexicon),
                actuator,
                rng: Mutex::new(rng),
                state: Mutex::new(SchedulerState {
                    state: VideoState::Idle,
                    current_clip: None,
                    active_sync: None,
                    generation: 0,
                    completed: 0,
                    failed: 0,
                }),
                timers: TimerSet::new("video-scheduler"),
                events: EventBus::new(),
                transition: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<VideoEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> VideoState {
        self.inner.state.lock().state
    }

    pub fn detect_emotion(&self, text: &str) -> Option<Emotion> {
        self.inner.detector.detect(text)
    }

    /// Choose a clip without touching the actuator.
    pub fn select_clip(
        &self,
        emotion: Option<Emotion>,
        audio_duration_secs: f64,
    ) -> VideoResult<VideoSelection> {
        self.inner.select_clip(emotion, audio_duration_secs)
    }

    /// Select and show a clip for `text`, then schedule the idle return.
    ///
    /// # Arguments
    /// * `text` - Utterance or chunk text, scored for emotion
    /// * `audio_duration_secs` - Length of the matching audio
    /// * `id` - Identifier reported in events
    /// * `options` - Emotion override and idle-return control
    ///
    /// # Returns
    /// The selection that was shown. On actuator failure the scheduler falls
    /// back to idle and returns the error; the switch is never retried.
    pub async fn sync(
        &self,
        text: &str,
        audio_duration_secs: f64,
        id: &str,
        options: SyncOptions,
    ) -> VideoResult<VideoSelection> {
        let inner = &self.inner;
        let generation = inner.begin(Some(id));

        let emotion = options
            .emotion_hint
            .or_else(|| inner.detector.detect(text));
        if let Some(emotion) = emotion {
            inner.events.publish(VideoEvent::EmotionDetected {
                sync_id: id.to_string(),
                emotion,
            });
        }

        let selection = match inner.select_clip(emotion, audio_duration_secs) {
            Ok(selection) => selection,
            Err(e) => {
                inner.record_failure(id, &e);
                return Err(e);
            }
        };
        let selection = if inner.config.enable_lip_sync {
            lipsync::refine(
                inner.config.lip_sync_strategy,
                selection,
                audio_duration_secs,
            )
            .selection
        } else {
            selection
        };

        let _transition = inner.transition.lock().await;
        if inner.state.lock().generation != generation {
            debug!("Video sync '{}' was superseded before its transition", id);
            return Ok(selection);
        }
        if let Err(source) = inner.actuator.change_video(&selection.clip_id).await {
            let error = VideoError::Actuator {
                clip_id: selection.clip_id.clone(),
                source,
            };
            warn!("Video sync '{}' failed: {}", id, error);
            inner.record_failure(id, &error);
            if let Err(e) = inner.show_idle(generation, Some(id.to_string())).await {
                warn!("Idle fallback after failed sync '{}' also failed: {}", id, e);
            }
            return Err(error);
        }

        {
            let mut state = inner.state.lock();
            if state.generation != generation {
                debug!("Video sync '{}' was superseded during transition", id);
                return Ok(selection);
            }
            state.state = match selection.category {
                ClipCategory::Idle => VideoState::Idle,
                ClipCategory::Talk => VideoState::Talking,
                ClipCategory::Emotion => VideoState::Emotion,
            };
            state.current_clip = Some(selection.clip_id.clone());
            state.completed += 1;
        }

        info!(
            "Video sync '{}': {:?} clip '{}' for {:.2}s",
            id, selection.category, selection.clip_id, audio_duration_secs
        );
        inner.events.publish(VideoEvent::VideoChanged {
            sync_id: id.to_string(),
            selection: selection.clone(),
        });

        if selection.category != ClipCategory::Idle && !options.skip_idle_return {
            let delay_ms = ((audio_duration_secs.max(0.0) * 1000.0).round() as u64)
                .saturating_add(inner.config.transition_buffer_ms);
            let weak: Weak<SchedulerInner> = Arc::downgrade(inner);
            let sync_id = id.to_string();
            inner
                .timers
                .schedule(Duration::from_millis(delay_ms), async move {
                    if let Some(inner) = weak.upgrade()
                        && let Err(e) = inner.switch_to_idle(generation, Some(sync_id)).await
                    {
                        warn!("Scheduled idle return failed: {}", e);
                    }
                });
        }

        Ok(selection)
    }

    /// Drop the idle-return timer and ignore in-flight transitions.
    pub fn cancel(&self) {
        self.inner.begin(None);
    }

    /// Switch to an idle clip now.
    pub async fn return_to_idle(&self) -> VideoResult<()> {
        let generation = self.inner.begin(None);
        self.inner.switch_to_idle(generation, None).await
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.pending()
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock();
        SchedulerStatus {
            state: state.state,
            current_clip: state.current_clip.clone(),
            active_sync_id: state.active_sync.clone(),
            completed_syncs: state.completed,
            failed_syncs: state.failed,
            pending_timers: self.inner.timers.pending(),
        }
    }
}

impl SchedulerInner {
    /// Supersede whatever is active and return the new generation.
    fn begin(&self, sync_id: Option<&str>) -> u64 {
        self.timers.clear();
        let mut state = self.state.lock();
        state.generation += 1;
        state.active_sync = sync_id.map(str::to_string);
        state.generation
    }

    fn pick(&self, clips: &[String]) -> Option<String> {
        clips.choose(&mut *self.rng.lock()).cloned()
    }

    fn select_clip(
        &self,
        emotion: Option<Emotion>,
        audio_duration_secs: f64,
    ) -> VideoResult<VideoSelection> {
        if let Some(emotion) = emotion
            && let Some(clip_id) = self
                .library
                .emotion_clips(emotion)
                .and_then(|clips| self.pick(clips))
        {
            return Ok(VideoSelection {
                clip_id,
                category: ClipCategory::Emotion,
                detected_emotion: Some(emotion),
            });
        }

        let in_talk_range = audio_duration_secs >= self.config.min_talking_duration_secs
            && audio_duration_secs <= self.config.max_talking_duration_secs;
        if in_talk_range && let Some(clip_id) = self.pick(&self.library.talk) {
            return Ok(VideoSelection {
                clip_id,
                category: ClipCategory::Talk,
                detected_emotion: emotion,
            });
        }

        self.pick(&self.library.idle)
            .map(|clip_id| VideoSelection {
                clip_id,
                category: ClipCategory::Idle,
                detected_emotion: emotion,
            })
            .ok_or(VideoError::NoIdleClip)
    }

    fn record_failure(&self, sync_id: &str, error: &VideoError) {
        self.state.lock().failed += 1;
        self.events.publish(VideoEvent::SyncFailed {
            sync_id: sync_id.to_string(),
            error: error.to_string(),
        });
    }

    async fn switch_to_idle(&self, generation: u64, sync_id: Option<String>) -> VideoResult<()> {
        let _transition = self.transition.lock().await;
        self.show_idle(generation, sync_id).await
    }

    /// Caller must hold the transition lock.
    async fn show_idle(&self, generation: u64, sync_id: Option<String>) -> VideoResult<()> {
        if self.state.lock().generation != generation {
            return Ok(());
        }
        let clip_id = self.pick(&self.library.idle).ok_or(VideoError::NoIdleClip)?;

        self.actuator
            .change_video(&clip_id)
            .await
            .map_err(|source| VideoError::Actuator {
                clip_id: clip_id.clone(),
                source,
            })?;

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Ok(());
            }
            state.state = VideoState::Idle;
            state.current_clip = Some(clip_id.clone());
            state.active_sync = None;
        }
        debug!("Returned to idle clip '{}'", clip_id);
        self.events
            .publish(VideoEvent::ReturnedToIdle { sync_id, clip_id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::testing::RecordingVideoActuator;
    use tokio::time::Instant;

    fn scheduler(actuator: Arc<RecordingVideoActuator>) -> VideoSyncScheduler {
        VideoSyncScheduler::new(
            VideoSyncConfig {
                random_seed: Some(7),
                ..Default::default()
            },
            ClipLibrary::default(),
            &EmotionLexicon::default(),
            actuator,
        )
    }

    fn is_idle_clip(clip: &str) -> bool {
        ClipLibrary::default().idle.iter().any(|c| c == clip)
    }

    #[tokio::test]
    async fn test_emotion_clip_takes_precedence() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = scheduler(actuator.clone());

        let selection = scheduler
            .sync("I am so happy today", 2.0, "u1", SyncOptions::default())
            .await
            .expect("sync succeeds");

        assert_eq!(selection.clip_id, "happy_01");
        assert_eq!(selection.category, ClipCategory::Emotion);
        assert_eq!(selection.detected_emotion, Some(Emotion::Happy));
        assert_eq!(scheduler.state(), VideoState::Emotion);
        assert_eq!(actuator.clips(), vec!["happy_01"]);
    }

    #[tokio::test]
    async fn test_talk_clip_within_duration_range() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = scheduler(actuator.clone());

        let selection = scheduler
            .sync("The report follows.", 2.0, "u1", SyncOptions::default())
            .await
            .expect("sync succeeds");

        assert_eq!(selection.category, ClipCategory::Talk);
        assert!(selection.clip_id.starts_with("talk_"));
        assert_eq!(scheduler.state(), VideoState::Talking);
        assert_eq!(scheduler.pending_timers(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_duration_falls_back_to_idle() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = scheduler(actuator.clone());

        let selection = scheduler
            .sync("Short.", 0.5, "u1", SyncOptions::default())
            .await
            .expect("sync succeeds");

        assert_eq!(selection.category, ClipCategory::Idle);
        assert!(is_idle_clip(&selection.clip_id));
        assert_eq!(scheduler.state(), VideoState::Idle);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[tokio::test]
    async fn test_emotion_hint_overrides_text() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = scheduler(actuator);

        let selection = scheduler
            .sync(
                "I am so happy",
                2.0,
                "u1",
                SyncOptions {
                    emotion_hint: Some(Emotion::Sad),
                    ..Default::default()
                },
            )
            .await
            .expect("sync succeeds");
        assert_eq!(selection.clip_id, "sad_01");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_return_after_audio_plus_buffer() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = scheduler(actuator.clone());
        let mut rx = scheduler.subscribe();

        let start = Instant::now();
        scheduler
            .sync("The report follows.", 2.0, "u1", SyncOptions::default())
            .await
            .expect("sync succeeds");

        loop {
            if let Some(VideoEvent::ReturnedToIdle { sync_id, clip_id }) = rx.recv().await {
                assert_eq!(sync_id.as_deref(), Some("u1"));
                assert!(is_idle_clip(&clip_id));
                break;
            }
        }
        assert_eq!(start.elapsed(), Duration::from_millis(2_500));
        assert_eq!(scheduler.state(), VideoState::Idle);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_sync_clears_previous_idle_return() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = scheduler(actuator.clone());
        let mut rx = scheduler.subscribe();

        scheduler
            .sync("First line.", 2.0, "a", SyncOptions::default())
            .await
            .expect("sync a");
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler
            .sync("Second line.", 5.0, "b", SyncOptions::default())
            .await
            .expect("sync b");
        assert_eq!(scheduler.pending_timers(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;

        let mut idle_returns = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let VideoEvent::ReturnedToIdle { sync_id, .. } = event {
                idle_returns.push(sync_id);
            }
        }
        assert_eq!(idle_returns, vec![Some("b".to_string())]);
    }

    #[tokio::test]
    async fn test_actuator_failure_fails_open_to_idle() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        actuator.fail_on("talk_01");
        actuator.fail_on("talk_02");
        let scheduler = scheduler(actuator.clone());
        let mut rx = scheduler.subscribe();

        let result = scheduler
            .sync("The report follows.", 2.0, "u1", SyncOptions::default())
            .await;

        assert!(matches!(result, Err(VideoError::Actuator { .. })));
        let clips = actuator.clips();
        assert_eq!(clips.len(), 1);
        assert!(is_idle_clip(&clips[0]));
        assert_eq!(scheduler.state(), VideoState::Idle);
        assert_eq!(scheduler.status().failed_syncs, 1);
        assert_eq!(scheduler.pending_timers(), 0);

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            saw_failure |= matches!(event, VideoEvent::SyncFailed { .. });
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_idle_return() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = scheduler(actuator);

        scheduler
            .sync("The report follows.", 2.0, "u1", SyncOptions::default())
            .await
            .expect("sync succeeds");
        assert_eq!(scheduler.pending_timers(), 1);

        scheduler.cancel();
        assert_eq!(scheduler.pending_timers(), 0);
        assert_eq!(scheduler.status().active_sync_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_return_to_idle_lands_after_inflight_sync() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        actuator.delay_on("happy", Duration::from_millis(300));
        let scheduler = scheduler(actuator.clone());

        let syncing = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .sync("I am so happy today", 2.0, "u1", SyncOptions::default())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        scheduler.return_to_idle().await.expect("idle");
        syncing.await.expect("sync task").expect("superseded sync is not an error");

        let clips = actuator.clips();
        assert!(is_idle_clip(clips.last().expect("clips shown")), "{clips:?}");
        assert_eq!(scheduler.state(), VideoState::Idle);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_duration_saturates_idle_return_delay() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = scheduler(actuator);

        let selection = scheduler
            .sync("I am so happy today", 1e300, "u1", SyncOptions::default())
            .await
            .expect("sync succeeds");

        assert_eq!(selection.category, ClipCategory::Emotion);
        assert_eq!(scheduler.pending_timers(), 1);
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(scheduler.state(), VideoState::Emotion);
    }

    #[tokio::test]
    async fn test_empty_library_reports_missing_idle() {
        let actuator = Arc::new(RecordingVideoActuator::default());
        let scheduler = VideoSyncScheduler::new(
            VideoSyncConfig::default(),
            ClipLibrary {
                idle: Vec::new(),
                talk: Vec::new(),
                emotions: Default::default(),
            },
            &EmotionLexicon::default(),
            actuator,
        );
        assert_eq!(scheduler.select_clip(None, 2.0), Err(VideoError::NoIdleClip));
    }
}
