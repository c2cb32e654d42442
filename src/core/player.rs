//! Common interface over the two playback paths.
//!
//! [`SequencedPlaybackController`] plays utterances that arrive already
//! synthesized; [`PipelineCoordinator`] synthesizes them from text. The
//! dispatcher only talks to this trait.

use async_trait::async_trait;

use crate::core::pipeline::{PipelineCoordinator, SessionOptions};
use crate::core::playback::{PlaybackContent, PlaybackError, SequencedPlaybackController};
use crate::errors::EngineResult;

/// What to present for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentRequest {
    /// Ready-to-play media produced upstream.
    Synthesized {
        utterance_id: String,
        content: PlaybackContent,
    },
    /// Plain text that still needs synthesis.
    RawText {
        utterance_id: String,
        text: String,
    },
}

impl PresentRequest {
    pub fn utterance_id(&self) -> &str {
        match self {
            Self::Synthesized { utterance_id, .. } | Self::RawText { utterance_id, .. } => {
                utterance_id
            }
        }
    }
}

#[async_trait]
pub trait UtterancePlayer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Present an utterance, superseding whatever this player is showing.
    async fn present(&self, request: PresentRequest) -> EngineResult<()>;

    /// Abort `utterance_id` if it is the one in progress.
    async fn supersede(&self, utterance_id: &str) -> bool;

    /// Stop everything and return to idle.
    async fn halt(&self);

    fn active_utterance(&self) -> Option<String>;
}

#[async_trait]
impl UtterancePlayer for SequencedPlaybackController {
    fn name(&self) -> &'static str {
        "sequenced-playback"
    }

    async fn present(&self, request: PresentRequest) -> EngineResult<()> {
        match request {
            PresentRequest::Synthesized {
                utterance_id,
                content,
            } => Ok(self.play(&utterance_id, content).await?),
            PresentRequest::RawText { utterance_id, .. } => {
                Err(PlaybackError::MissingAudio(utterance_id).into())
            }
        }
    }

    async fn supersede(&self, utterance_id: &str) -> bool {
        self.abort_if(utterance_id).await
    }

    async fn halt(&self) {
        self.stop().await;
    }

    fn active_utterance(&self) -> Option<String> {
        self.playing_utterance()
    }
}

#[async_trait]
impl UtterancePlayer for PipelineCoordinator {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    /// Synthesized content is re-synthesized from its text.
    async fn present(&self, request: PresentRequest) -> EngineResult<()> {
        let (utterance_id, text, emotion_hint) = match request {
            PresentRequest::Synthesized {
                utterance_id,
                content,
            } => (utterance_id, content.text, content.emotion),
            PresentRequest::RawText { utterance_id, text } => (utterance_id, text, None),
        };
        let options = SessionOptions {
            emotion_hint,
            ..Default::default()
        };
        self.start_session(&text, &utterance_id, options).await;
        Ok(())
    }

    async fn supersede(&self, utterance_id: &str) -> bool {
        if self.active_session_id().as_deref() != Some(utterance_id) {
            return false;
        }
        self.stop_session().await.is_some()
    }

    async fn halt(&self) {
        self.stop_session().await;
    }

    fn active_utterance(&self) -> Option<String> {
        self.active_session_id()
    }
}
