use serde::{Deserialize, Serialize};

use crate::core::player::PresentRequest;
use crate::core::playback::PlaybackContent;
use crate::core::video::Emotion;

/// Transport messages, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum IncomingMessage {
    /// Server-synthesized utterance for the sequenced playback path.
    SynthesizedUtterance {
        id: String,
        text: String,
        audio_url: String,
        audio_duration_sec: f64,
        talk_video_ref: String,
        idle_video_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emotion: Option<Emotion>,
    },
    /// Text for the client-side synthesis pipeline.
    RawTextUtterance { id: String, text: String },
    /// Abort the named utterance if it is still in progress.
    SupersedeSignal { id: String },
}

impl IncomingMessage {
    pub fn id(&self) -> &str {
        match self {
            Self::SynthesizedUtterance { id, .. }
            | Self::RawTextUtterance { id, .. }
            | Self::SupersedeSignal { id } => id,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::SynthesizedUtterance { .. } => "synthesized-utterance",
            Self::RawTextUtterance { .. } => "raw-text-utterance",
            Self::SupersedeSignal { .. } => "supersede-signal",
        }
    }

    /// The presentation request carried by an utterance message.
    pub fn into_request(self) -> Option<PresentRequest> {
        match self {
            Self::SynthesizedUtterance {
                id,
                text,
                audio_url,
                audio_duration_sec,
                talk_video_ref,
                idle_video_ref,
                emotion,
            } => Some(PresentRequest::Synthesized {
                utterance_id: id,
                content: PlaybackContent {
                    text,
                    audio_url,
                    audio_duration_sec,
                    talk_video_ref,
                    idle_video_ref,
                    emotion,
                },
            }),
            Self::RawTextUtterance { id, text } => Some(PresentRequest::RawText {
                utterance_id: id,
                text,
            }),
            Self::SupersedeSignal { .. } => None,
        }
    }
}
