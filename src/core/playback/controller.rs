//! Server-driven playback with strict mutual exclusion.
//!
//! Utterances arrive fully synthesized. Starting utterance n+1 aborts n
//! completely (audio paused and rewound, timers cleared, slot marked
//! aborted) before anything of n+1 reaches the effectors.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::slot::{PlaybackContent, PlaybackSlot, SlotState};
use crate::core::events::EventBus;
use crate::core::media::{AudioSink, MediaError, VideoActuator};
use crate::core::timers::TimerSet;
use crate::utils::get_current_time_ms;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("Audio playback failed: {0}")]
    Audio(#[source] MediaError),
    #[error("Talk video switch failed: {0}")]
    Video(#[source] MediaError),
    #[error("Invalid playback content: {0}")]
    InvalidContent(String),
    #[error("Utterance '{0}' has no synthesized audio")]
    MissingAudio(String),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay after the audio ends before switching to the idle clip.
    pub idle_grace_period_ms: u64,
    pub character_name: String,
    /// Clip shown when setup fails or no idle ref is available.
    pub default_idle_clip: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            idle_grace_period_ms: 1_500,
            character_name: "default".to_string(),
            default_idle_clip: "idle_01".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started {
        utterance_id: String,
        talk_video_ref: String,
    },
    /// Superseded by a newer utterance or an explicit supersede signal.
    Aborted { utterance_id: String },
    IdleReturned {
        utterance_id: String,
        clip_id: String,
    },
    Stopped { utterance_id: Option<String> },
    Error {
        utterance_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveCharacter {
    pub name: String,
    pub idle_clip: String,
}

struct ControllerState {
    slot: Option<PlaybackSlot>,
    /// Bumped on every play, abort and stop; stale idle timers check it.
    generation: u64,
    character: ActiveCharacter,
}

struct ControllerInner {
    config: PlaybackConfig,
    audio: Arc<dyn AudioSink>,
    video: Arc<dyn VideoActuator>,
    state: Mutex<ControllerState>,
    timers: TimerSet,
    events: EventBus<PlaybackEvent>,
    /// Serializes play/abort/stop so each transition completes before the next.
    transition: tokio::sync::Mutex<()>,
}

/// Plays pre-synthesized utterances one at a time.
#[derive(Clone)]
pub struct SequencedPlaybackController {
    inner: Arc<ControllerInner>,
}

impl SequencedPlaybackController {
    pub fn new(
        config: PlaybackConfig,
        audio: Arc<dyn AudioSink>,
        video: Arc<dyn VideoActuator>,
    ) -> Self {
        let character = ActiveCharacter {
            name: config.character_name.clone(),
            idle_clip: config.default_idle_clip.clone(),
        };
        Self {
            inner: Arc::new(ControllerInner {
                config,
                audio,
                video,
                state: Mutex::new(ControllerState {
                    slot: None,
                    generation: 0,
                    character,
                }),
                timers: TimerSet::new("playback-controller"),
                events: EventBus::new(),
                transition: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// Abort whatever is playing, then start `utterance_id`.
    ///
    /// Audio start and the talk-video switch run concurrently. If either
    /// fails, or the content itself is invalid, the controller emits
    /// [`PlaybackEvent::Error`], falls back to the active character's idle
    /// clip and returns the error. Otherwise the idle return is scheduled
    /// `idle_grace_period_ms` after the audio ends.
    pub async fn play(&self, utterance_id: &str, content: PlaybackContent) -> PlaybackResult<()> {
        let inner = &self.inner;
        let _transition = inner.transition.lock().await;
        inner.abort_current().await;

        let generation = {
            let mut state = inner.state.lock();
            state.generation += 1;
            state.slot = Some(PlaybackSlot {
                utterance_id: utterance_id.to_string(),
                content: content.clone(),
                start_time_ms: get_current_time_ms(),
                state: SlotState::Playing,
            });
            state.generation
        };
        info!(
            "Playing utterance '{}' ({} ms, talk clip '{}')",
            utterance_id,
            content.audio_duration_ms(),
            content.talk_video_ref
        );

        let setup = match validate(&content) {
            Ok(()) => {
                let source = content.audio_source();
                let (audio, video) = tokio::join!(
                    inner.audio.play(&source),
                    inner.video.change_video(&content.talk_video_ref)
                );
                audio
                    .map_err(PlaybackError::Audio)
                    .and(video.map_err(PlaybackError::Video))
            }
            Err(e) => Err(e),
        };

        if let Err(e) = setup {
            error!("Playback setup for '{}' failed: {}", utterance_id, e);
            inner.events.publish(PlaybackEvent::Error {
                utterance_id: utterance_id.to_string(),
                error: e.to_string(),
            });
            inner.fall_back_to_idle(generation).await;
            return Err(e);
        }

        inner.events.publish(PlaybackEvent::Started {
            utterance_id: utterance_id.to_string(),
            talk_video_ref: content.talk_video_ref.clone(),
        });

        let delay = Duration::from_millis(
            content
                .audio_duration_ms()
                .saturating_add(inner.config.idle_grace_period_ms),
        );
        let weak: Weak<ControllerInner> = Arc::downgrade(inner);
        let id = utterance_id.to_string();
        let idle_ref = content.idle_video_ref;
        inner.timers.schedule(delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.return_to_idle(generation, id, idle_ref).await;
            }
        });

        Ok(())
    }

    /// Abort the current utterance without an idle hop.
    ///
    /// Returns the id of the aborted utterance, if one was playing.
    pub async fn abort(&self) -> Option<String> {
        let _transition = self.inner.transition.lock().await;
        self.inner.abort_current().await
    }

    /// Abort only if `utterance_id` is the one playing.
    pub async fn abort_if(&self, utterance_id: &str) -> bool {
        let _transition = self.inner.transition.lock().await;
        let matches = self.inner.state.lock().slot.as_ref().is_some_and(|slot| {
            slot.utterance_id == utterance_id && slot.state == SlotState::Playing
        });
        if !matches {
            debug!("Ignoring abort for '{}': not the active utterance", utterance_id);
            return false;
        }
        self.inner.abort_current().await.is_some()
    }

    /// Hard halt: stop audio, clear timers and force the idle clip.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let _transition = inner.transition.lock().await;
        inner.timers.clear();

        let (was_playing, utterance_id, clip_id) = {
            let mut state = inner.state.lock();
            state.generation += 1;
            let fallback = state.character.idle_clip.clone();
            match state.slot.as_mut() {
                Some(slot) => {
                    let was_playing = slot.state == SlotState::Playing;
                    slot.state = SlotState::Idle;
                    let clip = if slot.content.idle_video_ref.is_empty() {
                        fallback
                    } else {
                        slot.content.idle_video_ref.clone()
                    };
                    (was_playing, Some(slot.utterance_id.clone()), clip)
                }
                None => (false, None, fallback),
            }
        };

        if was_playing {
            inner.audio.pause().await;
            inner.audio.set_current_time(0.0).await;
        }
        if let Err(e) = inner.video.change_video(&clip_id).await {
            warn!("Failed to switch to idle clip '{}' on stop: {}", clip_id, e);
        }
        info!("Playback stopped ({:?})", utterance_id);
        inner.events.publish(PlaybackEvent::Stopped { utterance_id });
    }

    /// Select the character whose idle clip is used for fallbacks.
    pub fn set_active_character(&self, name: impl Into<String>, idle_clip: impl Into<String>) {
        let character = ActiveCharacter {
            name: name.into(),
            idle_clip: idle_clip.into(),
        };
        debug!("Active character set to '{}'", character.name);
        self.inner.state.lock().character = character;
    }

    pub fn active_character(&self) -> ActiveCharacter {
        self.inner.state.lock().character.clone()
    }

    pub fn current_slot(&self) -> Option<PlaybackSlot> {
        self.inner.state.lock().slot.clone()
    }

    /// Id of the utterance currently in the playing state.
    pub fn playing_utterance(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .slot
            .as_ref()
            .filter(|slot| slot.state == SlotState::Playing)
            .map(|slot| slot.utterance_id.clone())
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.pending()
    }
}

fn validate(content: &PlaybackContent) -> PlaybackResult<()> {
    if !content.audio_duration_sec.is_finite() || content.audio_duration_sec < 0.0 {
        return Err(PlaybackError::InvalidContent(format!(
            "audio duration {} is not a valid length",
            content.audio_duration_sec
        )));
    }
    Ok(())
}

impl ControllerInner {
    /// Caller must hold the transition lock.
    async fn abort_current(&self) -> Option<String> {
        self.timers.clear();
        let aborted = {
            let mut state = self.state.lock();
            match state.slot.as_mut() {
                Some(slot) if slot.state == SlotState::Playing => {
                    slot.state = SlotState::Aborted;
                    let id = slot.utterance_id.clone();
                    state.generation += 1;
                    Some(id)
                }
                _ => None,
            }
        };

        let id = aborted?;
        self.audio.pause().await;
        self.audio.set_current_time(0.0).await;
        info!("Aborted utterance '{}'", id);
        self.events.publish(PlaybackEvent::Aborted {
            utterance_id: id.clone(),
        });
        Some(id)
    }

    async fn fall_back_to_idle(&self, generation: u64) {
        let clip_id = self.state.lock().character.idle_clip.clone();
        if let Err(e) = self.video.change_video(&clip_id).await {
            warn!("Fallback idle clip '{}' failed: {}", clip_id, e);
        }
        let mut state = self.state.lock();
        if state.generation == generation
            && let Some(slot) = state.slot.as_mut()
        {
            slot.state = SlotState::Idle;
        }
    }

    async fn return_to_idle(&self, generation: u64, utterance_id: String, idle_ref: String) {
        let _transition = self.transition.lock().await;
        if self.state.lock().generation != generation {
            return;
        }
        let clip_id = if idle_ref.is_empty() {
            self.state.lock().character.idle_clip.clone()
        } else {
            idle_ref
        };

        if let Err(e) = self.video.change_video(&clip_id).await {
            warn!("Idle return for '{}' failed: {}", utterance_id, e);
            self.events.publish(PlaybackEvent::Error {
                utterance_id,
                error: e.to_string(),
            });
            return;
        }

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            if let Some(slot) = state.slot.as_mut() {
                slot.state = SlotState::Idle;
            }
        }
        debug!("Utterance '{}' returned to idle clip '{}'", utterance_id, clip_id);
        self.events.publish(PlaybackEvent::IdleReturned {
            utterance_id,
            clip_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::testing::{AudioCall, RecordingAudioSink, RecordingVideoActuator};
    use tokio::time::Instant;

    fn content(name: &str, secs: f64) -> PlaybackContent {
        PlaybackContent {
            text: format!("text of {name}"),
            audio_url: format!("mock://{name}"),
            audio_duration_sec: secs,
            talk_video_ref: format!("talk_{name}"),
            idle_video_ref: format!("idle_{name}"),
            emotion: None,
        }
    }

    fn setup() -> (
        SequencedPlaybackController,
        Arc<RecordingAudioSink>,
        Arc<RecordingVideoActuator>,
    ) {
        let audio = Arc::new(RecordingAudioSink::default());
        let video = Arc::new(RecordingVideoActuator::default());
        let controller =
            SequencedPlaybackController::new(PlaybackConfig::default(), audio.clone(), video.clone());
        (controller, audio, video)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_play_starts_audio_and_talk_video() {
        let (controller, audio, video) = setup();
        let mut rx = controller.subscribe();

        controller.play("u1", content("a", 2.0)).await.expect("play");

        assert_eq!(audio.calls(), vec![AudioCall::Play("mock://a".to_string())]);
        assert_eq!(video.clips(), vec!["talk_a"]);
        assert_eq!(controller.playing_utterance().as_deref(), Some("u1"));
        assert_eq!(controller.pending_timers(), 1);
        assert_eq!(
            drain(&mut rx),
            vec![PlaybackEvent::Started {
                utterance_id: "u1".to_string(),
                talk_video_ref: "talk_a".to_string(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_return_after_grace_period() {
        let (controller, _audio, video) = setup();
        let mut rx = controller.subscribe();

        let start = Instant::now();
        controller.play("u1", content("a", 2.0)).await.expect("play");

        loop {
            if let Some(PlaybackEvent::IdleReturned { utterance_id, clip_id }) = rx.recv().await {
                assert_eq!(utterance_id, "u1");
                assert_eq!(clip_id, "idle_a");
                break;
            }
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3_500));
        assert!(elapsed < Duration::from_millis(4_000));
        assert_eq!(video.clips(), vec!["talk_a", "idle_a"]);
        assert_eq!(
            controller.current_slot().map(|slot| slot.state),
            Some(SlotState::Idle)
        );
        assert_eq!(controller.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_play_aborts_previous_first() {
        let (controller, audio, video) = setup();
        let mut rx = controller.subscribe();

        controller.play("u1", content("a", 2.0)).await.expect("play a");
        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.play("u2", content("b", 2.0)).await.expect("play b");

        assert_eq!(
            audio.calls(),
            vec![
                AudioCall::Play("mock://a".to_string()),
                AudioCall::Pause,
                AudioCall::Seek(0.0),
                AudioCall::Play("mock://b".to_string()),
            ]
        );
        assert_eq!(controller.pending_timers(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let events = drain(&mut rx);
        assert!(events.contains(&PlaybackEvent::Aborted {
            utterance_id: "u1".to_string()
        }));
        let idle_returns: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::IdleReturned { utterance_id, .. } => Some(utterance_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(idle_returns, vec!["u2"]);
        // No idle hop between the two talk clips.
        assert_eq!(video.clips(), vec!["talk_a", "talk_b", "idle_b"]);
    }

    #[tokio::test]
    async fn test_setup_error_falls_back_to_character_idle() {
        let (controller, audio, video) = setup();
        *audio.fail_play.lock() = true;
        controller.set_active_character("mika", "mika_idle");
        let mut rx = controller.subscribe();

        let result = controller.play("u1", content("a", 2.0)).await;

        assert!(matches!(result, Err(PlaybackError::Audio(_))));
        assert_eq!(video.clips(), vec!["talk_a", "mika_idle"]);
        assert_eq!(controller.pending_timers(), 0);
        assert_eq!(
            controller.current_slot().map(|slot| slot.state),
            Some(SlotState::Idle)
        );
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [PlaybackEvent::Error { utterance_id, .. }] if utterance_id == "u1"
        ));
    }

    #[tokio::test]
    async fn test_abort_has_no_idle_hop() {
        let (controller, _audio, video) = setup();
        controller.play("u1", content("a", 2.0)).await.expect("play");

        assert_eq!(controller.abort().await.as_deref(), Some("u1"));
        assert_eq!(controller.pending_timers(), 0);
        assert_eq!(video.clips(), vec!["talk_a"]);
        assert_eq!(
            controller.current_slot().map(|slot| slot.state),
            Some(SlotState::Aborted)
        );
        assert_eq!(controller.abort().await, None);
    }

    #[tokio::test]
    async fn test_abort_if_requires_matching_id() {
        let (controller, _audio, _video) = setup();
        controller.play("u1", content("a", 2.0)).await.expect("play");

        assert!(!controller.abort_if("u0").await);
        assert_eq!(controller.playing_utterance().as_deref(), Some("u1"));
        assert!(controller.abort_if("u1").await);
        assert_eq!(controller.playing_utterance(), None);
    }

    #[tokio::test]
    async fn test_stop_forces_idle() {
        let (controller, audio, video) = setup();
        let mut rx = controller.subscribe();
        controller.play("u1", content("a", 2.0)).await.expect("play");

        controller.stop().await;

        assert_eq!(controller.pending_timers(), 0);
        assert_eq!(video.clips(), vec!["talk_a", "idle_a"]);
        assert!(audio.calls().contains(&AudioCall::Pause));
        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&PlaybackEvent::Stopped {
                utterance_id: Some("u1".to_string())
            })
        );
        assert!(!events.iter().any(|e| matches!(e, PlaybackEvent::Aborted { .. })));
    }

    #[tokio::test]
    async fn test_invalid_duration_is_rejected() {
        let (controller, audio, _video) = setup();
        let result = controller.play("u1", content("a", -1.0)).await;
        assert!(matches!(result, Err(PlaybackError::InvalidContent(_))));
        assert!(audio.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_content_still_aborts_current() {
        let (controller, _audio, video) = setup();
        controller.play("u1", content("a", 2.0)).await.expect("play");
        let mut rx = controller.subscribe();

        let result = controller.play("u2", content("b", f64::NAN)).await;

        assert!(matches!(result, Err(PlaybackError::InvalidContent(_))));
        assert_eq!(controller.playing_utterance(), None);
        assert_eq!(controller.pending_timers(), 0);
        assert_eq!(video.clips(), vec!["talk_a", "idle_01"]);
        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [
                PlaybackEvent::Aborted { utterance_id: aborted },
                PlaybackEvent::Error { utterance_id: failed, .. },
            ] if aborted == "u1" && failed == "u2"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_duration_does_not_overflow_idle_delay() {
        let (controller, _audio, _video) = setup();
        controller.play("u1", content("a", 1e300)).await.expect("play");

        assert_eq!(controller.playing_utterance().as_deref(), Some("u1"));
        assert_eq!(controller.pending_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inflight_idle_return_cannot_override_next_talk_clip() {
        let (controller, _audio, video) = setup();
        video.delay_on("idle", Duration::from_millis(300));

        controller.play("u1", content("a", 2.0)).await.expect("play a");
        // The idle switch for u1 starts at 3.5 s and lands at 3.8 s.
        tokio::time::sleep(Duration::from_millis(3_600)).await;
        controller.play("u2", content("b", 2.0)).await.expect("play b");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(video.clips(), vec!["talk_a", "idle_a", "talk_b"]);
        assert_eq!(controller.playing_utterance().as_deref(), Some("u2"));
    }
}
