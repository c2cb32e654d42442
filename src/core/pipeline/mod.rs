//! Session orchestration for client-driven synthesis.

pub mod config;
pub mod coordinator;
pub mod events;
pub mod session;
pub mod stats;

pub use config::{PipelineConfig, SessionOptions, SyncMode};
pub use coordinator::{CoordinatorStatus, PipelineCoordinator, PipelineError, PipelineResult};
pub use events::PipelineEvent;
pub use session::{
    EntryStages, FallbackMode, PipelineEntry, Session, SessionStatus, Stage, StageRecord,
    StageStatus,
};
pub use stats::{PipelineStats, StatsRegistry, global_stats};
