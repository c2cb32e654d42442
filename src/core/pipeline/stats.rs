//! Process-wide pipeline statistics.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;

static GLOBAL_STATS: Lazy<Arc<StatsRegistry>> = Lazy::new(|| Arc::new(StatsRegistry::new()));

/// The registry shared by every coordinator in the process.
pub fn global_stats() -> Arc<StatsRegistry> {
    GLOBAL_STATS.clone()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub total_sessions: u64,
    pub successful_sessions: u64,
    pub failed_sessions: u64,
    /// Mean over finished (successful or failed) sessions.
    pub average_processing_time_ms: f64,
    pub total_chunks_processed: u64,
}

#[derive(Debug, Default)]
pub struct StatsRegistry {
    stats: RwLock<PipelineStats>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.stats.write().total_sessions += 1;
    }

    pub fn record_finished(&self, success: bool, processing_time_ms: u64, chunks: usize) {
        let mut stats = self.stats.write();
        if success {
            stats.successful_sessions += 1;
        } else {
            stats.failed_sessions += 1;
        }
        let finished = (stats.successful_sessions + stats.failed_sessions) as f64;
        stats.average_processing_time_ms +=
            (processing_time_ms as f64 - stats.average_processing_time_ms) / finished;
        stats.total_chunks_processed += chunks as u64;
    }

    pub fn snapshot(&self) -> PipelineStats {
        self.stats.read().clone()
    }
}
