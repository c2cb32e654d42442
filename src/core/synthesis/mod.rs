//! Text-to-speech synthesis: backend abstraction, the priority job queue and
//! the ordered playback queue.

pub mod base;
pub mod http;
pub mod playback_queue;
pub mod queue;

pub use base::{
    MediaProbe, MetadataProbe, Pronunciation, SynthesisBackend, SynthesisError,
    SynthesisOptions, SynthesisOutput, SynthesisResult, SynthesizedAudio, pcm_duration_secs,
};
pub use http::{
    HttpBackendConfig, HttpSynthesisBackend, JsonRequestBuilder, PronunciationReplacer,
    SynthesisRequestBuilder,
};
pub use playback_queue::{PlaybackItem, PlaybackQueue, PlaybackQueueEvent};
pub use queue::{
    JobEvent, JobRequest, JobStatus, QueueConfig, QueueStatus, SynthesisJob, SynthesisJobQueue,
};
