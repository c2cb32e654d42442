//! Effector interfaces for the audio sink and the video actuator.
//!
//! Both are external collaborators: the engine only tells them what to do
//! and when. The tracing-backed implementations are used by the binary and
//! are handy when wiring the engine up without a real player.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors reported by effectors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MediaError {
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),
    #[error("Clip unavailable: {0}")]
    ClipUnavailable(String),
    #[error("Metadata load failed: {0}")]
    MetadataUnavailable(String),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Where playable audio lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AudioSource {
    /// Remote or local media address.
    Url { url: String },
    /// Raw encoded audio held in memory.
    Bytes {
        #[serde(skip)]
        data: Bytes,
        format: String,
        sample_rate: u32,
    },
}

impl AudioSource {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Bytes {
                data,
                format,
                sample_rate,
            } => format!("{} bytes of {format}@{sample_rate}Hz", data.len()),
        }
    }
}

/// A single audio output with `play`/`pause`/`current_time` semantics.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Start playing `source` from the current position.
    async fn play(&self, source: &AudioSource) -> MediaResult<()>;

    async fn pause(&self);

    async fn set_current_time(&self, seconds: f64);

    async fn current_time(&self) -> f64;
}

/// Switches the visible video clip.
#[async_trait]
pub trait VideoActuator: Send + Sync {
    async fn change_video(&self, clip_id: &str) -> MediaResult<()>;
}

/// Audio sink that only logs what it is asked to do.
#[derive(Debug, Default)]
pub struct TracingAudioSink {
    position: parking_lot::Mutex<f64>,
}

#[async_trait]
impl AudioSink for TracingAudioSink {
    async fn play(&self, source: &AudioSource) -> MediaResult<()> {
        info!("audio: play {}", source.describe());
        Ok(())
    }

    async fn pause(&self) {
        info!("audio: pause");
    }

    async fn set_current_time(&self, seconds: f64) {
        *self.position.lock() = seconds;
        info!("audio: seek to {:.3}s", seconds);
    }

    async fn current_time(&self) -> f64 {
        *self.position.lock()
    }
}

/// Video actuator that only logs clip switches.
#[derive(Debug, Default)]
pub struct TracingVideoActuator;

#[async_trait]
impl VideoActuator for TracingVideoActuator {
    async fn change_video(&self, clip_id: &str) -> MediaResult<()> {
        info!("video: change to '{}'", clip_id);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording effectors shared by unit tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub enum AudioCall {
        Play(String),
        Pause,
        Seek(f64),
    }

    #[derive(Default)]
    pub struct RecordingAudioSink {
        pub calls: Mutex<Vec<AudioCall>>,
        pub fail_play: Mutex<bool>,
    }

    impl RecordingAudioSink {
        pub fn calls(&self) -> Vec<AudioCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl AudioSink for RecordingAudioSink {
        async fn play(&self, source: &AudioSource) -> MediaResult<()> {
            self.calls.lock().push(AudioCall::Play(source.describe()));
            if *self.fail_play.lock() {
                return Err(MediaError::PlaybackFailed("sink rejected".to_string()));
            }
            Ok(())
        }

        async fn pause(&self) {
            self.calls.lock().push(AudioCall::Pause);
        }

        async fn set_current_time(&self, seconds: f64) {
            self.calls.lock().push(AudioCall::Seek(seconds));
        }

        async fn current_time(&self) -> f64 {
            0.0
        }
    }

    #[derive(Default)]
    pub struct RecordingVideoActuator {
        pub clips: Mutex<Vec<String>>,
        pub failing: Mutex<HashSet<String>>,
        /// Clip prefixes whose switch takes this long to land.
        pub slow: Mutex<Vec<(String, Duration)>>,
    }

    impl RecordingVideoActuator {
        pub fn clips(&self) -> Vec<String> {
            self.clips.lock().clone()
        }

        pub fn fail_on(&self, clip_id: &str) {
            self.failing.lock().insert(clip_id.to_string());
        }

        pub fn delay_on(&self, prefix: &str, delay: Duration) {
            self.slow.lock().push((prefix.to_string(), delay));
        }
    }

    #[async_trait]
    impl VideoActuator for RecordingVideoActuator {
        async fn change_video(&self, clip_id: &str) -> MediaResult<()> {
            if self.failing.lock().contains(clip_id) {
                return Err(MediaError::ClipUnavailable(clip_id.to_string()));
            }
            let delay = self
                .slow
                .lock()
                .iter()
                .find(|(prefix, _)| clip_id.starts_with(prefix.as_str()))
                .map(|(_, delay)| *delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.clips.lock().push(clip_id.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_sources() {
        assert_eq!(AudioSource::url("https://a/b.mp3").describe(), "https://a/b.mp3");
        let bytes = AudioSource::Bytes {
            data: Bytes::from_static(&[0u8; 48]),
            format: "linear16".to_string(),
            sample_rate: 24000,
        };
        assert_eq!(bytes.describe(), "48 bytes of linear16@24000Hz");
    }

    #[tokio::test]
    async fn test_tracing_sink_tracks_position() {
        let sink = TracingAudioSink::default();
        sink.set_current_time(1.5).await;
        assert_eq!(sink.current_time().await, 1.5);
    }
}
