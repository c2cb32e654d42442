use serde::{Deserialize, Serialize};

use crate::core::media::AudioSource;
use crate::core::video::Emotion;

/// Pre-synthesized media for one server-driven utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackContent {
    pub text: String,
    pub audio_url: String,
    pub audio_duration_sec: f64,
    pub talk_video_ref: String,
    pub idle_video_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
}

impl PlaybackContent {
    pub fn audio_source(&self) -> AudioSource {
        AudioSource::url(self.audio_url.clone())
    }

    /// Audio length in whole milliseconds; invalid durations count as zero.
    pub fn audio_duration_ms(&self) -> u64 {
        if self.audio_duration_sec.is_finite() {
            (self.audio_duration_sec.max(0.0) * 1000.0).round() as u64
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Playing,
    Idle,
    /// Superseded by a newer utterance. Not a failure.
    Aborted,
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SlotState::Playing)
    }
}

/// The controller's single playback register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSlot {
    pub utterance_id: String,
    pub content: PlaybackContent,
    pub start_time_ms: u64,
    pub state: SlotState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_uses_camel_case_fields() {
        let json = r#"{
            "text": "Hi",
            "audioUrl": "https://cdn/a.mp3",
            "audioDurationSec": 1.5,
            "talkVideoRef": "talk_01",
            "idleVideoRef": "idle_01",
            "emotion": "happy"
        }"#;
        let content: PlaybackContent = serde_json::from_str(json).expect("valid content");
        assert_eq!(content.audio_duration_ms(), 1500);
        assert_eq!(content.emotion, Some(Emotion::Happy));
        assert_eq!(content.audio_source(), AudioSource::url("https://cdn/a.mp3"));
    }

    #[test]
    fn test_invalid_duration_counts_as_zero() {
        let content = PlaybackContent {
            text: String::new(),
            audio_url: String::new(),
            audio_duration_sec: f64::NAN,
            talk_video_ref: String::new(),
            idle_video_ref: String::new(),
            emotion: None,
        };
        assert_eq!(content.audio_duration_ms(), 0);
    }
}
