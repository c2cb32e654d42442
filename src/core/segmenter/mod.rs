//! Text segmentation for subtitle pacing and chunked synthesis.
//!
//! Splits an utterance into ordered [`TextChunk`]s and estimates how long
//! each one takes to read. The estimate only paces display when no real
//! audio duration is known.

mod config;
mod splitter;

pub use config::{SegmentMode, SegmenterConfig};
pub use splitter::{ChunkKind, SegmentError, SegmentResult, TextChunk, TextSegmenter};
