//! Configuration module for the streamsync engine
//!
//! Configuration comes from environment variables, optionally layered under
//! a YAML file. The configuration is split into logical submodules:
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use streamsync::config::EngineConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = EngineConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config = EngineConfig::from_file(&PathBuf::from("streamsync.yaml"))?;
//! println!("Sync mode: {:?}", config.pipeline.sync_mode);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::cache::CacheConfig;
use crate::core::pipeline::PipelineConfig;
use crate::core::playback::PlaybackConfig;
use crate::core::segmenter::SegmenterConfig;
use crate::core::synthesis::{HttpBackendConfig, QueueConfig};
use crate::core::video::{ClipLibrary, Emotion, EmotionLexicon, VideoSyncConfig};

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use utils::parse_bool;

/// Engine configuration
///
/// One section per component, plus the clip library and optional emotion
/// keyword overrides for the video scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub segmenter: SegmenterConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub video: VideoSyncConfig,
    pub clips: ClipLibrary,
    /// Replaces the built-in lexicon when set.
    pub emotion_keywords: Option<HashMap<Emotion, Vec<String>>>,
    pub pipeline: PipelineConfig,
    pub playback: PlaybackConfig,
    pub synthesis: HttpBackendConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file with environment variable fallbacks
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables
    /// 3. Default values
    ///
    /// The merged configuration is validated before it is returned.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // The .env file is not loaded here: the YAML file is the source of
        // truth and only real environment variables fill its gaps.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_engine_config(&config)?;
        Ok(config)
    }

    /// The emotion lexicon to use for detection.
    pub fn lexicon(&self) -> EmotionLexicon {
        match &self.emotion_keywords {
            Some(map) => EmotionLexicon::from_map(map),
            None => EmotionLexicon::default(),
        }
    }

    /// Whether an HTTP synthesis endpoint is configured.
    pub fn has_synthesis_endpoint(&self) -> bool {
        !self.synthesis.url.is_empty()
    }
}
