//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use streamsync::EngineConfig;
use streamsync::core::media::{AudioSink, AudioSource, MediaResult, VideoActuator};
use streamsync::core::synthesis::{
    MetadataProbe, SynthesisBackend, SynthesisOptions, SynthesisResult, SynthesizedAudio,
};
use streamsync::state::EngineState;

/// Backend that "hosts" every utterance at `test://<text>` and declares a
/// fixed duration.
pub struct FixedBackend {
    pub duration_secs: f64,
    pub requests: Mutex<Vec<String>>,
}

impl FixedBackend {
    pub fn new(duration_secs: f64) -> Arc<Self> {
        Arc::new(Self {
            duration_secs,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SynthesisBackend for FixedBackend {
    async fn synthesize(
        &self,
        text: &str,
        _options: &SynthesisOptions,
    ) -> SynthesisResult<SynthesizedAudio> {
        self.requests.lock().push(text.to_string());
        Ok(SynthesizedAudio {
            source: AudioSource::url(format!("test://{text}")),
            declared_duration_secs: Some(self.duration_secs),
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Play(String),
    Pause,
    Seek(f64),
    Clip(String),
}

/// One log for both effectors, so tests can assert cross-modal ordering.
#[derive(Default)]
pub struct EffectLog {
    effects: Mutex<Vec<Effect>>,
}

impl EffectLog {
    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }

    pub fn plays(&self) -> Vec<String> {
        self.effects()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Play(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn clips(&self) -> Vec<String> {
        self.effects()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Clip(clip) => Some(clip),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl AudioSink for EffectLog {
    async fn play(&self, source: &AudioSource) -> MediaResult<()> {
        self.effects.lock().push(Effect::Play(source.describe()));
        Ok(())
    }

    async fn pause(&self) {
        self.effects.lock().push(Effect::Pause);
    }

    async fn set_current_time(&self, seconds: f64) {
        self.effects.lock().push(Effect::Seek(seconds));
    }

    async fn current_time(&self) -> f64 {
        0.0
    }
}

#[async_trait]
impl VideoActuator for EffectLog {
    async fn change_video(&self, clip_id: &str) -> MediaResult<()> {
        self.effects.lock().push(Effect::Clip(clip_id.to_string()));
        Ok(())
    }
}

/// Engine with a seeded clip choice, wired to a shared effect log.
pub fn engine(config: EngineConfig, duration_secs: f64) -> (Arc<EngineState>, Arc<EffectLog>) {
    let mut config = config;
    config.video.random_seed = Some(7);
    let log = Arc::new(EffectLog::default());
    let state = EngineState::new(
        config,
        FixedBackend::new(duration_secs),
        Arc::new(MetadataProbe),
        log.clone(),
        log.clone(),
    );
    (state, log)
}

/// Receive events until `done` matches one, returning everything seen.
pub async fn collect_until<E>(
    rx: &mut UnboundedReceiver<E>,
    mut done: impl FnMut(&E) -> bool,
) -> Vec<E> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("event before timeout")
            .expect("sender alive");
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}
