use std::env;

use super::EngineConfig;
use super::utils::{
    parse_env, parse_env_bool, parse_lip_sync_strategy, parse_segment_mode, parse_sync_mode,
};
use super::yaml::YamlConfig;
use crate::core::cache::CacheConfig;
use crate::core::pipeline::PipelineConfig;
use crate::core::playback::PlaybackConfig;
use crate::core::segmenter::SegmenterConfig;
use crate::core::synthesis::{HttpBackendConfig, QueueConfig};
use crate::core::video::VideoSyncConfig;

/// Read an enum-valued environment variable through one of the `parse_*`
/// helpers, failing on values the helper does not recognize.
fn parse_env_with<T>(
    name: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    match env::var(name) {
        Ok(raw) => parse(raw.trim())
            .map(Some)
            .ok_or_else(|| format!("Invalid {name} environment variable: '{raw}'").into()),
        Err(_) => Ok(None),
    }
}

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration to use as overrides
///
/// # Returns
/// * `Result<EngineConfig, Box<dyn std::error::Error>>` - The merged configuration or an error
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro for string values with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok())
                .unwrap_or_else(|| $default)
        };
    }

    // Helper macro for optional string values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env::var($env_var).ok())
        };
    }

    // Helper macro for parsed values: YAML > ENV (parsed) > Default
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match $yaml_value {
                Some(value) => value,
                None => parse_env($env_var)?.unwrap_or($default),
            }
        };
    }

    // Segmenter
    let segmenter_yaml = yaml.segmenter.unwrap_or_default();
    let segmenter_defaults = SegmenterConfig::default();
    let segmenter = SegmenterConfig {
        mode: match segmenter_yaml.mode {
            Some(mode) => mode,
            None => parse_env_with("SEGMENT_MODE", parse_segment_mode)?
                .unwrap_or(segmenter_defaults.mode),
        },
        chunk_size: get_parsed!(
            "SEGMENT_CHUNK_SIZE",
            segmenter_yaml.chunk_size,
            segmenter_defaults.chunk_size
        ),
        reading_rate: get_parsed!(
            "READING_RATE",
            segmenter_yaml.reading_rate,
            segmenter_defaults.reading_rate
        ),
        max_input_chars: segmenter_yaml
            .max_input_chars
            .unwrap_or(segmenter_defaults.max_input_chars),
        ..segmenter_defaults
    };

    // Synthesis endpoint and job queue
    let synthesis_yaml = yaml.synthesis.unwrap_or_default();
    let synthesis_defaults = HttpBackendConfig::default();
    let synthesis = HttpBackendConfig {
        url: get_value!(
            "SYNTHESIS_URL",
            synthesis_yaml.url,
            synthesis_defaults.url.clone()
        ),
        api_key: get_optional!("SYNTHESIS_API_KEY", synthesis_yaml.api_key),
        default_voice: get_optional!("SYNTHESIS_VOICE", synthesis_yaml.voice),
        audio_format: get_value!(
            "SYNTHESIS_AUDIO_FORMAT",
            synthesis_yaml.audio_format,
            synthesis_defaults.audio_format.clone()
        ),
        sample_rate: get_parsed!(
            "SYNTHESIS_SAMPLE_RATE",
            synthesis_yaml.sample_rate,
            synthesis_defaults.sample_rate
        ),
        request_timeout_secs: synthesis_yaml
            .request_timeout_secs
            .unwrap_or(synthesis_defaults.request_timeout_secs),
        pronunciations: synthesis_yaml.pronunciations.unwrap_or_default(),
    };

    let queue_defaults = QueueConfig::default();
    let queue = QueueConfig {
        max_concurrent_jobs: get_parsed!(
            "SYNTHESIS_MAX_CONCURRENT",
            synthesis_yaml.max_concurrent_jobs,
            queue_defaults.max_concurrent_jobs
        ),
        timeout_ms: get_parsed!(
            "SYNTHESIS_TIMEOUT_MS",
            synthesis_yaml.timeout_ms,
            queue_defaults.timeout_ms
        ),
        retry_attempts: get_parsed!(
            "SYNTHESIS_RETRY_ATTEMPTS",
            synthesis_yaml.retry_attempts,
            queue_defaults.retry_attempts
        ),
    };

    // Cache
    let cache_yaml = yaml.cache.unwrap_or_default();
    let cache = CacheConfig {
        max_entries: get_parsed!(
            "CACHE_MAX_ENTRIES",
            cache_yaml.max_entries,
            CacheConfig::default().max_entries
        ),
        ttl_seconds: match cache_yaml.ttl_seconds {
            Some(ttl) => Some(ttl),
            None => parse_env("CACHE_TTL_SECONDS")?,
        },
    };

    // Video scheduler
    let video_yaml = yaml.video.unwrap_or_default();
    let video_defaults = VideoSyncConfig::default();
    let video = VideoSyncConfig {
        min_talking_duration_secs: get_parsed!(
            "VIDEO_MIN_TALK_SECS",
            video_yaml.min_talking_duration_secs,
            video_defaults.min_talking_duration_secs
        ),
        max_talking_duration_secs: get_parsed!(
            "VIDEO_MAX_TALK_SECS",
            video_yaml.max_talking_duration_secs,
            video_defaults.max_talking_duration_secs
        ),
        transition_buffer_ms: get_parsed!(
            "VIDEO_TRANSITION_BUFFER_MS",
            video_yaml.transition_buffer_ms,
            video_defaults.transition_buffer_ms
        ),
        enable_lip_sync: match video_yaml.enable_lip_sync {
            Some(enabled) => enabled,
            None => parse_env_bool("VIDEO_LIP_SYNC")?.unwrap_or(video_defaults.enable_lip_sync),
        },
        lip_sync_strategy: match video_yaml.lip_sync_strategy {
            Some(strategy) => strategy,
            None => parse_env_with("VIDEO_LIP_SYNC_STRATEGY", parse_lip_sync_strategy)?
                .unwrap_or(video_defaults.lip_sync_strategy),
        },
        random_seed: match video_yaml.random_seed {
            Some(seed) => Some(seed),
            None => parse_env("VIDEO_RANDOM_SEED")?,
        },
    };
    let clips = video_yaml.clips.unwrap_or_default();
    let emotion_keywords = video_yaml.emotion_keywords;

    // Pipeline
    let pipeline_yaml = yaml.pipeline.unwrap_or_default();
    let pipeline_defaults = PipelineConfig::default();
    let pipeline = PipelineConfig {
        sync_mode: match pipeline_yaml.sync_mode {
            Some(mode) => mode,
            None => parse_env_with("PIPELINE_SYNC_MODE", parse_sync_mode)?
                .unwrap_or(pipeline_defaults.sync_mode),
        },
        max_concurrent_chunks: get_parsed!(
            "PIPELINE_MAX_CONCURRENT_CHUNKS",
            pipeline_yaml.max_concurrent_chunks,
            pipeline_defaults.max_concurrent_chunks
        ),
        buffering_delay_ms: get_parsed!(
            "PIPELINE_BUFFERING_DELAY_MS",
            pipeline_yaml.buffering_delay_ms,
            pipeline_defaults.buffering_delay_ms
        ),
        fallback_to_text: match pipeline_yaml.fallback_to_text {
            Some(enabled) => enabled,
            None => parse_env_bool("PIPELINE_FALLBACK_TO_TEXT")?
                .unwrap_or(pipeline_defaults.fallback_to_text),
        },
        enable_video_sync: match pipeline_yaml.enable_video_sync {
            Some(enabled) => enabled,
            None => parse_env_bool("PIPELINE_VIDEO_SYNC")?
                .unwrap_or(pipeline_defaults.enable_video_sync),
        },
    };

    // Playback controller
    let playback_yaml = yaml.playback.unwrap_or_default();
    let playback_defaults = PlaybackConfig::default();
    let playback = PlaybackConfig {
        idle_grace_period_ms: get_parsed!(
            "PLAYBACK_IDLE_GRACE_MS",
            playback_yaml.idle_grace_period_ms,
            playback_defaults.idle_grace_period_ms
        ),
        character_name: get_value!(
            "CHARACTER_NAME",
            playback_yaml.character_name,
            playback_defaults.character_name.clone()
        ),
        default_idle_clip: get_value!(
            "CHARACTER_IDLE_CLIP",
            playback_yaml.default_idle_clip,
            playback_defaults.default_idle_clip.clone()
        ),
    };

    Ok(EngineConfig {
        segmenter,
        queue,
        cache,
        video,
        clips,
        emotion_keywords,
        pipeline,
        playback,
        synthesis,
    })
}
