//! # Synthesis Base Types
//!
//! Shared types for turning text into playable audio: the request options,
//! the synthesized result, the error taxonomy, and the two collaborator
//! traits the job queue depends on.
//!
//! - [`SynthesisBackend`] performs the (possibly slow) text-to-speech call.
//! - [`MediaProbe`] loads the duration of the resulting media before a job
//!   is declared complete.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use streamsync::core::synthesis::{SynthesisBackend, SynthesisOptions};
//!
//! async fn speak(backend: &dyn SynthesisBackend) {
//!     let options = SynthesisOptions {
//!         voice: Some("aria".to_string()),
//!         ..Default::default()
//!     };
//!     let audio = backend.synthesize("Hello there.", &options).await;
//!     println!("{:?}", audio.map(|a| a.source.describe()));
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::media::AudioSource;

/// Synthesis-specific error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SynthesisError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Synthesis timed out after {0} ms")]
    Timeout(u64),

    #[error("Media load failed: {0}")]
    MediaLoadFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Pronunciation replacement configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pronunciation {
    /// Word to replace
    pub word: String,
    /// Pronunciation to use instead
    pub pronunciation: String,
}

/// Per-request synthesis options. Part of the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

impl SynthesisOptions {
    /// Stable textual form of the options, used for cache keying.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Raw result of a backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub source: AudioSource,
    /// Duration reported by the backend, if any.
    pub declared_duration_secs: Option<f64>,
}

/// A completed synthesis: playable audio plus its loaded duration.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    pub audio: SynthesizedAudio,
    pub duration_secs: f64,
}

impl SynthesisOutput {
    pub fn duration_ms(&self) -> u64 {
        (self.duration_secs * 1000.0).round().max(0.0) as u64
    }
}

/// Text-to-speech backend used by the job queue.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize `text` into audio.
    ///
    /// Implementations should not retry internally; the queue owns retry
    /// and timeout policy.
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> SynthesisResult<SynthesizedAudio>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Get provider-specific information
    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({ "provider": self.name() })
    }
}

/// Loads media metadata for a synthesized result.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Duration of `audio` in seconds.
    async fn load_duration(&self, audio: &SynthesizedAudio) -> SynthesisResult<f64>;
}

/// Bytes per sample for the raw PCM-like formats we can measure directly.
fn bytes_per_sample(format: &str) -> Option<usize> {
    match format {
        "linear16" | "pcm" => Some(2),
        "mulaw" | "ulaw" | "alaw" => Some(1),
        _ => None,
    }
}

/// Duration of mono PCM-like audio in seconds, or `None` for container formats.
pub fn pcm_duration_secs(byte_len: usize, format: &str, sample_rate: u32) -> Option<f64> {
    let bytes_per_sample = bytes_per_sample(format)?;
    if sample_rate == 0 {
        return None;
    }
    let samples = byte_len / bytes_per_sample;
    Some(samples as f64 / sample_rate as f64)
}

/// Probe that trusts backend-declared durations and measures raw PCM.
///
/// Anything else (a bare URL to a container file without a declared
/// duration) cannot be measured in-process and fails the load.
#[derive(Debug, Default, Clone)]
pub struct MetadataProbe;

#[async_trait]
impl MediaProbe for MetadataProbe {
    async fn load_duration(&self, audio: &SynthesizedAudio) -> SynthesisResult<f64> {
        if let Some(duration) = audio.declared_duration_secs
            && duration.is_finite()
            && duration >= 0.0
        {
            return Ok(duration);
        }

        match &audio.source {
            AudioSource::Bytes {
                data,
                format,
                sample_rate,
            } => pcm_duration_secs(data.len(), format, *sample_rate).ok_or_else(|| {
                SynthesisError::MediaLoadFailed(format!(
                    "cannot measure duration of '{format}' audio"
                ))
            }),
            AudioSource::Url { url } => Err(SynthesisError::MediaLoadFailed(format!(
                "no duration available for {url}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_fingerprint_changes_with_options() {
        let a = SynthesisOptions::default();
        let b = SynthesisOptions {
            voice: Some("aria".to_string()),
            ..Default::default()
        };
        assert_eq!(a.fingerprint(), "{}");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(b.fingerprint(), b.clone().fingerprint());
    }

    #[test]
    fn test_pcm_duration() {
        // 24kHz mono linear16: 48000 bytes is one second.
        assert_eq!(pcm_duration_secs(48_000, "linear16", 24_000), Some(1.0));
        assert_eq!(pcm_duration_secs(8_000, "mulaw", 8_000), Some(1.0));
        assert_eq!(pcm_duration_secs(1_000, "mp3", 24_000), None);
        assert_eq!(pcm_duration_secs(1_000, "pcm", 0), None);
    }

    #[tokio::test]
    async fn test_metadata_probe_prefers_declared_duration() {
        let probe = MetadataProbe;
        let audio = SynthesizedAudio {
            source: AudioSource::url("https://cdn/clip.mp3"),
            declared_duration_secs: Some(2.5),
        };
        assert_eq!(probe.load_duration(&audio).await, Ok(2.5));
    }

    #[tokio::test]
    async fn test_metadata_probe_measures_pcm_and_rejects_unknown() {
        let probe = MetadataProbe;
        let pcm = SynthesizedAudio {
            source: AudioSource::Bytes {
                data: Bytes::from(vec![0u8; 24_000]),
                format: "linear16".to_string(),
                sample_rate: 24_000,
            },
            declared_duration_secs: None,
        };
        assert_eq!(probe.load_duration(&pcm).await, Ok(0.5));

        let bare = SynthesizedAudio {
            source: AudioSource::url("https://cdn/clip.mp3"),
            declared_duration_secs: None,
        };
        assert!(matches!(
            probe.load_duration(&bare).await,
            Err(SynthesisError::MediaLoadFailed(_))
        ));
    }

    #[test]
    fn test_output_duration_ms() {
        let output = SynthesisOutput {
            audio: SynthesizedAudio {
                source: AudioSource::url("x"),
                declared_duration_secs: None,
            },
            duration_secs: 1.25,
        };
        assert_eq!(output.duration_ms(), 1250);
    }
}
