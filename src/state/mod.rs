use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::core::dispatch::{DispatchOutcome, Dispatcher, IncomingMessage};
use crate::core::media::{AudioSink, VideoActuator};
use crate::core::pipeline::PipelineCoordinator;
use crate::core::playback::SequencedPlaybackController;
use crate::core::segmenter::TextSegmenter;
use crate::core::synthesis::{
    HttpSynthesisBackend, MediaProbe, MetadataProbe, PlaybackQueue, SynthesisBackend,
    SynthesisJobQueue,
};
use crate::core::video::VideoSyncScheduler;
use crate::errors::EngineResult;

/// Engine state shared by everything that feeds utterances in
///
/// Owns one instance of every component, wired to a single pair of
/// effectors. Components are cheap handles, so callers may clone them out.
#[derive(Clone)]
pub struct EngineState {
    pub config: EngineConfig,
    pub queue: SynthesisJobQueue,
    pub playback_queue: PlaybackQueue,
    pub scheduler: VideoSyncScheduler,
    pub controller: SequencedPlaybackController,
    pub coordinator: PipelineCoordinator,
    pub dispatcher: Arc<Dispatcher>,
}

impl EngineState {
    /// Build the engine around an explicit synthesis backend and probe.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn SynthesisBackend>,
        probe: Arc<dyn MediaProbe>,
        audio: Arc<dyn AudioSink>,
        video: Arc<dyn VideoActuator>,
    ) -> Arc<Self> {
        let queue = SynthesisJobQueue::new(config.queue.clone(), backend, probe, &config.cache);
        let playback_queue = PlaybackQueue::new(audio.clone());
        let scheduler = VideoSyncScheduler::new(
            config.video.clone(),
            config.clips.clone(),
            &config.lexicon(),
            video.clone(),
        );
        let controller = SequencedPlaybackController::new(config.playback.clone(), audio, video);
        let coordinator = PipelineCoordinator::new(
            config.pipeline.clone(),
            TextSegmenter::new(config.segmenter.clone()),
            queue.clone(),
            playback_queue.clone(),
            scheduler.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(controller.clone()),
            Arc::new(coordinator.clone()),
        ));

        info!(
            "Engine ready: sync mode {:?}, {} clips for character '{}'",
            config.pipeline.sync_mode,
            config.clips.total_clips(),
            config.playback.character_name
        );

        Arc::new(Self {
            config,
            queue,
            playback_queue,
            scheduler,
            controller,
            coordinator,
            dispatcher,
        })
    }

    /// Build the engine with the configured HTTP synthesis backend.
    ///
    /// # Errors
    /// Fails when no synthesis URL is configured.
    pub fn from_config(
        config: EngineConfig,
        audio: Arc<dyn AudioSink>,
        video: Arc<dyn VideoActuator>,
    ) -> EngineResult<Arc<Self>> {
        let backend = HttpSynthesisBackend::from_config(config.synthesis.clone())?;
        Ok(Self::new(
            config,
            Arc::new(backend),
            Arc::new(MetadataProbe),
            audio,
            video,
        ))
    }

    /// Speak `text` through the pipeline under a freshly generated id.
    pub async fn speak(&self, text: impl Into<String>) -> EngineResult<DispatchOutcome> {
        let id = uuid::Uuid::new_v4().to_string();
        self.dispatcher
            .dispatch(IncomingMessage::RawTextUtterance {
                id,
                text: text.into(),
            })
            .await
    }
}
