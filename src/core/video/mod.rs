//! Video sync: emotion detection, clip selection and idle/talk transitions.

pub mod emotion;
pub mod library;
pub mod lipsync;
pub mod scheduler;

pub use emotion::{Emotion, EmotionDetector, EmotionLexicon};
pub use library::{ClipCategory, ClipLibrary, VideoSelection};
pub use lipsync::{LipSyncPlan, LipSyncStrategy};
pub use scheduler::{
    SchedulerStatus, SyncOptions, VideoError, VideoEvent, VideoResult, VideoState,
    VideoSyncConfig, VideoSyncScheduler,
};
