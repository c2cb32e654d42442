use serde::Serialize;

use super::config::SyncMode;
use super::session::{FallbackMode, SessionStatus, Stage, StageStatus};
use crate::core::video::VideoSelection;

/// Session lifecycle notifications from the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineEvent {
    SessionStarted {
        session_id: String,
        total_chunks: usize,
        sync_mode: SyncMode,
    },
    SessionBuffering {
        session_id: String,
        delay_ms: u64,
    },
    ChunkProgress {
        session_id: String,
        chunk_index: usize,
        stage: Stage,
        status: StageStatus,
    },
    /// Subtitle text to show as its chunk is released.
    ChunkDisplay {
        session_id: String,
        chunk_index: usize,
        text: String,
        display_duration_ms: u64,
        has_audio: bool,
    },
    VideoChanged {
        session_id: String,
        chunk_index: usize,
        selection: VideoSelection,
    },
    SessionCompleted {
        session_id: String,
        status: SessionStatus,
        fallback_mode: Option<FallbackMode>,
        processing_time_ms: u64,
        failed_chunks: usize,
    },
    SessionStopped {
        session_id: String,
    },
    Error {
        session_id: String,
        chunk_index: Option<usize>,
        error: String,
    },
}

impl PipelineEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::SessionBuffering { session_id, .. }
            | Self::ChunkProgress { session_id, .. }
            | Self::ChunkDisplay { session_id, .. }
            | Self::VideoChanged { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::SessionStopped { session_id }
            | Self::Error { session_id, .. } => session_id,
        }
    }
}
