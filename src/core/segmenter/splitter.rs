use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::{SegmentMode, SegmenterConfig};

/// Errors raised by [`TextSegmenter::try_segment`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Input too long: {len} characters exceeds the limit of {max}")]
    InputTooLong { len: usize, max: usize },
}

pub type SegmentResult<T> = Result<T, SegmentError>;

/// How a chunk boundary was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Sentence,
    Clause,
    Basic,
}

/// One ordered piece of an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position within the utterance, starting at 0.
    pub index: usize,
    pub text: String,
    pub kind: ChunkKind,
    /// Reading-time heuristic. Real audio duration supersedes it.
    pub estimated_duration_ms: u64,
}

/// Splits utterance text into chunks with duration estimates.
#[derive(Debug, Clone, Default)]
pub struct TextSegmenter {
    config: SegmenterConfig,
}

impl TextSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Split `text` into ordered chunks.
    ///
    /// Empty or whitespace-only input yields an empty list. Input length is
    /// not checked here; use [`Self::try_segment`] for bounded input.
    pub fn segment(&self, text: &str) -> Vec<TextChunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let pieces = match self.config.mode {
            SegmentMode::Smart => self.smart_pieces(text),
            SegmentMode::Basic => self.basic_pieces(text),
        };

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, (text, kind))| {
                let estimated_duration_ms = self.estimate_duration_ms(&text);
                TextChunk {
                    index,
                    text,
                    kind,
                    estimated_duration_ms,
                }
            })
            .collect()
    }

    /// Like [`Self::segment`], but rejects input over `max_input_chars`.
    pub fn try_segment(&self, text: &str) -> SegmentResult<Vec<TextChunk>> {
        let len = text.chars().count();
        if len > self.config.max_input_chars {
            return Err(SegmentError::InputTooLong {
                len,
                max: self.config.max_input_chars,
            });
        }
        Ok(self.segment(text))
    }

    /// Estimated reading time for `text` in milliseconds.
    ///
    /// CJK ideographs, kana and hangul count as script characters; any other
    /// non-whitespace character costs `other_char_factor` of one.
    pub fn estimate_duration_ms(&self, text: &str) -> u64 {
        let (script, other) = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .fold((0usize, 0usize), |(script, other), c| {
                if is_script_char(c) {
                    (script + 1, other)
                } else {
                    (script, other + 1)
                }
            });

        let per_char = self.config.ms_per_script_char();
        let total =
            script as f64 * per_char + other as f64 * per_char * self.config.other_char_factor;
        total.round() as u64
    }

    fn smart_pieces(&self, text: &str) -> Vec<(String, ChunkKind)> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut pieces = Vec::new();

        for sentence in split_sentences(text) {
            if sentence.chars().count() <= chunk_size * 2 {
                pieces.push((sentence, ChunkKind::Sentence));
                continue;
            }

            let clauses = pack_clauses(&sentence, chunk_size);
            if clauses.len() <= 1 {
                pieces.push((sentence, ChunkKind::Sentence));
            } else {
                pieces.extend(clauses.into_iter().map(|c| (c, ChunkKind::Clause)));
            }
        }

        pieces
    }

    fn basic_pieces(&self, text: &str) -> Vec<(String, ChunkKind)> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.config.chunk_size.max(1))
            .filter_map(|slice| {
                let piece: String = slice.iter().collect();
                let piece = piece.trim();
                (!piece.is_empty()).then(|| (piece.to_string(), ChunkKind::Basic))
            })
            .collect()
    }
}

fn is_sentence_delimiter(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

fn is_clause_delimiter(c: char) -> bool {
    matches!(c, ',' | ';' | '，' | '；' | '、')
}

fn is_closing_mark(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | '」' | '』' | '）' | '”' | '’')
}

fn is_script_char(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF     // hiragana, katakana
        | 0x3400..=0x4DBF   // CJK extension A
        | 0x4E00..=0x9FFF   // CJK unified ideographs
        | 0xF900..=0xFAFF   // CJK compatibility ideographs
        | 0xAC00..=0xD7AF   // hangul syllables
    )
}

/// Split on sentence delimiters, keeping the delimiter with its sentence.
///
/// An ASCII period only ends a sentence when followed by whitespace, the end
/// of input, or another terminator, so decimals stay intact. Newlines always
/// end a sentence and are dropped.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    let mut flush = |current: &mut String| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            flush(&mut current);
            continue;
        }

        current.push(c);
        if !is_sentence_delimiter(c) {
            continue;
        }

        if c == '.'
            && let Some(&next) = chars.peek()
            && !(next.is_whitespace() || is_sentence_delimiter(next) || is_closing_mark(next))
        {
            continue;
        }

        while let Some(&next) = chars.peek() {
            if is_sentence_delimiter(next) || is_closing_mark(next) {
                current.push(next);
                chars.next();
            } else {
                break;
            }
        }
        flush(&mut current);
    }
    flush(&mut current);

    sentences
}

/// Split a sentence on clause delimiters and greedily pack the clauses into
/// pieces of at most `chunk_size` characters. A single clause longer than
/// `chunk_size` becomes its own piece.
fn pack_clauses(sentence: &str, chunk_size: usize) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut start = 0;
    for (i, c) in sentence.char_indices() {
        if is_clause_delimiter(c) {
            let end = i + c.len_utf8();
            clauses.push(&sentence[start..end]);
            start = end;
        }
    }
    if start < sentence.len() {
        clauses.push(&sentence[start..]);
    }

    let mut packed = Vec::new();
    let mut buffer = String::new();
    for clause in clauses {
        if !buffer.trim().is_empty() {
            let candidate_len = buffer.trim_start().chars().count() + clause.trim_end().chars().count();
            if candidate_len > chunk_size {
                packed.push(buffer.trim().to_string());
                buffer.clear();
            }
        }
        buffer.push_str(clause);
    }
    if !buffer.trim().is_empty() {
        packed.push(buffer.trim().to_string());
    }

    packed
}
