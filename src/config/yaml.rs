use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::pipeline::SyncMode;
use crate::core::segmenter::SegmentMode;
use crate::core::synthesis::Pronunciation;
use crate::core::video::{ClipLibrary, Emotion, LipSyncStrategy};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values missing
/// from the file fall back to environment variables, then defaults.
///
/// # Example YAML structure
/// ```yaml
/// segmenter:
///   mode: smart
///   chunk_size: 50
///   reading_rate: 375
///
/// synthesis:
///   url: "https://tts.example.com/v1/speak"
///   api_key: "your-api-key"
///   voice: "aria"
///   max_concurrent_jobs: 2
///   timeout_ms: 15000
///   retry_attempts: 2
///
/// cache:
///   max_entries: 10000
///   ttl_seconds: 3600
///
/// video:
///   min_talking_duration_secs: 1.0
///   max_talking_duration_secs: 30.0
///   transition_buffer_ms: 500
///   clips:
///     idle: [idle_01, idle_02]
///     talk: [talk_01, talk_02]
///
/// pipeline:
///   sync_mode: realtime
///   max_concurrent_chunks: 3
///
/// playback:
///   idle_grace_period_ms: 1500
///   character_name: "default"
///   default_idle_clip: "idle_01"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub segmenter: Option<SegmenterYaml>,
    pub synthesis: Option<SynthesisYaml>,
    pub cache: Option<CacheYaml>,
    pub video: Option<VideoYaml>,
    pub pipeline: Option<PipelineYaml>,
    pub playback: Option<PlaybackYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SegmenterYaml {
    pub mode: Option<SegmentMode>,
    pub chunk_size: Option<usize>,
    pub reading_rate: Option<f64>,
    pub max_input_chars: Option<usize>,
}

/// Synthesis endpoint and queue settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub voice: Option<String>,
    pub audio_format: Option<String>,
    pub sample_rate: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub max_concurrent_jobs: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub pronunciations: Option<Vec<Pronunciation>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub max_entries: Option<u64>,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VideoYaml {
    pub min_talking_duration_secs: Option<f64>,
    pub max_talking_duration_secs: Option<f64>,
    pub transition_buffer_ms: Option<u64>,
    pub enable_lip_sync: Option<bool>,
    pub lip_sync_strategy: Option<LipSyncStrategy>,
    pub random_seed: Option<u64>,
    pub clips: Option<ClipLibrary>,
    pub emotion_keywords: Option<HashMap<Emotion, Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineYaml {
    pub sync_mode: Option<SyncMode>,
    pub max_concurrent_chunks: Option<usize>,
    pub buffering_delay_ms: Option<u64>,
    pub fallback_to_text: Option<bool>,
    pub enable_video_sync: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlaybackYaml {
    pub idle_grace_period_ms: Option<u64>,
    pub character_name: Option<String>,
    pub default_idle_clip: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Result<Self, Box<dyn std::error::Error>>` - The parsed configuration or an error
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config file {}: {e}", path.display()))?;

        Ok(config)
    }
}
