pub mod cache;
pub mod dispatch;
pub mod events;
pub mod media;
pub mod pipeline;
pub mod playback;
pub mod player;
pub mod segmenter;
pub mod synthesis;
pub mod timers;
pub mod video;

// Re-export commonly used types for convenience
pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher, IncomingMessage, Route};
pub use events::EventBus;
pub use media::{AudioSink, AudioSource, MediaError, VideoActuator};
pub use pipeline::{
    PipelineConfig, PipelineCoordinator, PipelineError, PipelineEvent, SessionOptions, SyncMode,
};
pub use playback::{
    PlaybackConfig, PlaybackContent, PlaybackError, PlaybackEvent, SequencedPlaybackController,
};
pub use player::{PresentRequest, UtterancePlayer};
pub use segmenter::{SegmentError, SegmentMode, SegmenterConfig, TextChunk, TextSegmenter};
pub use synthesis::{
    HttpSynthesisBackend, JobEvent, PlaybackQueue, QueueConfig, SynthesisBackend, SynthesisError,
    SynthesisJobQueue, SynthesisOptions,
};
pub use timers::TimerSet;
pub use video::{Emotion, VideoEvent, VideoSelection, VideoSyncConfig, VideoSyncScheduler};
