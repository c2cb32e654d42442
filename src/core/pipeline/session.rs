//! Per-session bookkeeping: chunk entries and their stage records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::segmenter::TextChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Buffering,
    Processing,
    /// Segmented and waiting for a manual trigger.
    Ready,
    Completed,
    Failed,
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Stopped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackMode {
    TextOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    TextReady,
    TtsQueued,
    TtsCompleted,
    VideoSynced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageRecord {
    pub status: StageStatus,
    pub timestamp_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryStages {
    pub text_ready: StageRecord,
    pub tts_queued: StageRecord,
    pub tts_completed: StageRecord,
    pub video_synced: StageRecord,
}

impl EntryStages {
    pub fn get(&self, stage: Stage) -> &StageRecord {
        match stage {
            Stage::TextReady => &self.text_ready,
            Stage::TtsQueued => &self.tts_queued,
            Stage::TtsCompleted => &self.tts_completed,
            Stage::VideoSynced => &self.video_synced,
        }
    }

    fn get_mut(&mut self, stage: Stage) -> &mut StageRecord {
        match stage {
            Stage::TextReady => &mut self.text_ready,
            Stage::TtsQueued => &mut self.tts_queued,
            Stage::TtsCompleted => &mut self.tts_completed,
            Stage::VideoSynced => &mut self.video_synced,
        }
    }

    fn all(&self) -> [&StageRecord; 4] {
        [
            &self.text_ready,
            &self.tts_queued,
            &self.tts_completed,
            &self.video_synced,
        ]
    }
}

/// One chunk's progress through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEntry {
    pub chunk_id: String,
    pub chunk: TextChunk,
    pub stages: EntryStages,
    pub start_time_ms: u64,
    pub end_time_ms: Option<u64>,
    /// Real audio length once synthesis succeeded.
    pub audio_duration_ms: Option<u64>,
}

impl PipelineEntry {
    /// A new entry has its text stage completed.
    pub fn new(chunk_id: String, chunk: TextChunk, now_ms: u64) -> Self {
        let mut entry = Self {
            chunk_id,
            chunk,
            stages: EntryStages::default(),
            start_time_ms: now_ms,
            end_time_ms: None,
            audio_duration_ms: None,
        };
        entry.set(Stage::TextReady, StageStatus::Completed, None, now_ms);
        entry
    }

    pub fn set(&mut self, stage: Stage, status: StageStatus, detail: Option<String>, now_ms: u64) {
        let record = self.stages.get_mut(stage);
        record.status = status;
        record.timestamp_ms = Some(now_ms);
        record.detail = detail;
        if self.end_time_ms.is_none() && self.is_terminal() {
            self.end_time_ms = Some(now_ms);
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.stages.get(stage).status
    }

    /// Every stage has completed or failed.
    pub fn is_terminal(&self) -> bool {
        self.stages.all().iter().all(|r| r.status.is_terminal())
    }

    pub fn audio_failed(&self) -> bool {
        self.status(Stage::TtsCompleted) == StageStatus::Failed
    }

    /// Subtitle display time: real audio length when known, else the estimate.
    pub fn display_duration_ms(&self) -> u64 {
        self.audio_duration_ms
            .unwrap_or(self.chunk.estimated_duration_ms)
    }
}

/// One run of the pipeline for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub utterance_text: String,
    pub start_time_ms: u64,
    pub status: SessionStatus,
    pub total_chunks: usize,
    /// Chunks whose synthesis has settled.
    pub processed_chunks: usize,
    pub entries: BTreeMap<usize, PipelineEntry>,
}

impl Session {
    pub fn is_complete(&self) -> bool {
        self.entries.values().all(PipelineEntry::is_terminal)
    }

    pub fn failed_chunks(&self) -> usize {
        self.entries.values().filter(|e| e.audio_failed()).count()
    }

    /// No chunk produced audio.
    pub fn all_audio_failed(&self) -> bool {
        !self.entries.is_empty() && self.failed_chunks() == self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::segmenter::ChunkKind;

    fn entry() -> PipelineEntry {
        PipelineEntry::new(
            "s:0".to_string(),
            TextChunk {
                index: 0,
                text: "Hi.".to_string(),
                kind: ChunkKind::Sentence,
                estimated_duration_ms: 300,
            },
            1_000,
        )
    }

    #[test]
    fn test_new_entry_has_text_ready() {
        let entry = entry();
        assert_eq!(entry.status(Stage::TextReady), StageStatus::Completed);
        assert_eq!(entry.status(Stage::TtsQueued), StageStatus::Pending);
        assert!(!entry.is_terminal());
        assert_eq!(entry.display_duration_ms(), 300);
    }

    #[test]
    fn test_entry_end_time_set_once_terminal() {
        let mut entry = entry();
        entry.set(Stage::TtsQueued, StageStatus::Completed, None, 1_100);
        entry.set(Stage::TtsCompleted, StageStatus::Failed, Some("timeout".into()), 1_200);
        assert_eq!(entry.end_time_ms, None);
        entry.set(Stage::VideoSynced, StageStatus::Failed, None, 1_300);
        assert!(entry.is_terminal());
        assert!(entry.audio_failed());
        assert_eq!(entry.end_time_ms, Some(1_300));
    }
}
