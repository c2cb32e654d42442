use thiserror::Error;

use crate::core::dispatch::DispatchError;
use crate::core::media::MediaError;
use crate::core::pipeline::PipelineError;
use crate::core::playback::PlaybackError;
use crate::core::segmenter::SegmentError;
use crate::core::synthesis::SynthesisError;
use crate::core::video::VideoError;

/// Engine-wide error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Short category name for logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Synthesis(_) => "synthesis",
            EngineError::Segment(_) => "segment",
            EngineError::Video(_) => "video",
            EngineError::Media(_) => "media",
            EngineError::Pipeline(_) => "pipeline",
            EngineError::Playback(_) => "playback",
            EngineError::Dispatch(_) => "dispatch",
            EngineError::Config(_) => "config",
        }
    }
}

/// Engine result type
pub type EngineResult<T> = Result<T, EngineError>;
