use serde::{Deserialize, Serialize};

/// How text is cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMode {
    /// Sentence boundaries, with clause splitting for long sentences.
    #[default]
    Smart,
    /// Fixed-width character slices.
    Basic,
}

/// Configuration for [`super::TextSegmenter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub mode: SegmentMode,
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Reading speed in script characters per minute.
    pub reading_rate: f64,
    /// Relative reading cost of a non-script character.
    pub other_char_factor: f64,
    /// Inputs longer than this are rejected by `try_segment`.
    pub max_input_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            mode: SegmentMode::Smart,
            chunk_size: 50,
            reading_rate: 375.0,
            other_char_factor: 0.7,
            max_input_chars: 10_000,
        }
    }
}

impl SegmenterConfig {
    /// Milliseconds spent on one script character at the configured rate.
    pub fn ms_per_script_char(&self) -> f64 {
        if self.reading_rate <= 0.0 {
            return 0.0;
        }
        60_000.0 / self.reading_rate
    }
}
