use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::emotion::Emotion;

/// Category of a video clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipCategory {
    Idle,
    Talk,
    Emotion,
}

/// The outcome of clip selection for one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSelection {
    pub clip_id: String,
    pub category: ClipCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_emotion: Option<Emotion>,
}

/// Available clips for one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipLibrary {
    pub idle: Vec<String>,
    pub talk: Vec<String>,
    pub emotions: HashMap<Emotion, Vec<String>>,
}

impl Default for ClipLibrary {
    fn default() -> Self {
        let emotions = Emotion::ALL
            .into_iter()
            .map(|e| (e, vec![format!("{}_01", e.as_str())]))
            .collect();
        Self {
            idle: vec!["idle_01".to_string(), "idle_02".to_string()],
            talk: vec!["talk_01".to_string(), "talk_02".to_string()],
            emotions,
        }
    }
}

impl ClipLibrary {
    /// Clips for `emotion`, or `None` when the set is missing or empty.
    pub fn emotion_clips(&self, emotion: Emotion) -> Option<&[String]> {
        self.emotions
            .get(&emotion)
            .map(Vec::as_slice)
            .filter(|clips| !clips.is_empty())
    }

    pub fn total_clips(&self) -> usize {
        self.idle.len() + self.talk.len() + self.emotions.values().map(Vec::len).sum::<usize>()
    }
}
