use serde::{Deserialize, Serialize};

use crate::core::synthesis::SynthesisOptions;
use crate::core::video::Emotion;

/// When chunks are synthesized and released relative to segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Queue every chunk at once and release in order as audio arrives.
    #[default]
    Realtime,
    /// Pre-queue a window of chunks and start after a fixed delay.
    Buffered,
    /// Segment only; wait for an explicit trigger.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sync_mode: SyncMode,
    /// Window of chunks kept in synthesis at once in buffered mode.
    pub max_concurrent_chunks: usize,
    pub buffering_delay_ms: u64,
    /// Complete with a text-only fallback instead of failing silently.
    pub fallback_to_text: bool,
    pub enable_video_sync: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Realtime,
            max_concurrent_chunks: 3,
            buffering_delay_ms: 1_000,
            fallback_to_text: true,
            enable_video_sync: true,
        }
    }
}

/// Per-session overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOptions {
    pub sync_mode: Option<SyncMode>,
    pub synthesis: SynthesisOptions,
    /// Skip emotion scoring and use this emotion for every chunk.
    pub emotion_hint: Option<Emotion>,
}
