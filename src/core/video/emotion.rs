//! Keyword-based emotion detection.

use std::collections::HashMap;
use std::fmt;

use moka::sync::Cache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Angry,
    Sad,
    Surprised,
    Nod,
    Thinking,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Happy,
        Emotion::Angry,
        Emotion::Sad,
        Emotion::Surprised,
        Emotion::Nod,
        Emotion::Thinking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Angry => "angry",
            Emotion::Sad => "sad",
            Emotion::Surprised => "surprised",
            Emotion::Nod => "nod",
            Emotion::Thinking => "thinking",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keywords per emotion. Order matters: ties go to the earlier emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionLexicon {
    pub entries: Vec<(Emotion, Vec<String>)>,
}

impl Default for EmotionLexicon {
    fn default() -> Self {
        let table: [(Emotion, &[&str]); 6] = [
            (
                Emotion::Happy,
                &[
                    "happy", "glad", "great", "love", "thanks", "thank you", "wonderful", "haha",
                    "yay", "嬉しい", "楽しい", "ありがとう", "最高",
                ],
            ),
            (
                Emotion::Angry,
                &["angry", "annoyed", "furious", "hate", "mad", "怒", "ムカつく", "許さない"],
            ),
            (
                Emotion::Sad,
                &["sad", "sorry", "unfortunately", "miss you", "cry", "悲しい", "残念", "寂しい"],
            ),
            (
                Emotion::Surprised,
                &["wow", "amazing", "incredible", "no way", "really?", "驚", "すごい", "まじ"],
            ),
            (
                Emotion::Nod,
                &["yes", "okay", "i see", "right", "sure", "got it", "indeed", "うん", "なるほど", "そうだね"],
            ),
            (
                Emotion::Thinking,
                &["hmm", "let me think", "maybe", "perhaps", "i wonder", "考え", "うーん", "かな"],
            ),
        ];

        Self {
            entries: table
                .into_iter()
                .map(|(emotion, words)| (emotion, words.iter().map(|w| w.to_string()).collect()))
                .collect(),
        }
    }
}

impl EmotionLexicon {
    /// Build a lexicon from a keyword map, keeping the canonical emotion order.
    pub fn from_map(map: &HashMap<Emotion, Vec<String>>) -> Self {
        Self {
            entries: Emotion::ALL
                .into_iter()
                .filter_map(|e| map.get(&e).map(|words| (e, words.clone())))
                .collect(),
        }
    }
}

/// Compile a keyword into a case-insensitive pattern. Word boundaries are
/// only asserted next to word characters so "really?" and "怒" still match.
fn keyword_pattern(keyword: &str) -> Option<Regex> {
    let keyword = keyword.trim();
    let first = keyword.chars().next()?;
    let last = keyword.chars().last()?;
    let boundary = |c: char| c.is_ascii_alphanumeric();

    let pattern = format!(
        "(?i){}{}{}",
        if boundary(first) { r"\b" } else { "" },
        regex::escape(keyword),
        if boundary(last) { r"\b" } else { "" },
    );
    match Regex::new(&pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            error!("Failed to compile emotion keyword '{}': {}", keyword, e);
            None
        }
    }
}

/// Scores text against an [`EmotionLexicon`], caching results per exact text.
pub struct EmotionDetector {
    patterns: Vec<(Emotion, Vec<Regex>)>,
    cache: Cache<String, Option<Emotion>>,
}

impl EmotionDetector {
    pub fn new(lexicon: &EmotionLexicon) -> Self {
        let patterns = lexicon
            .entries
            .iter()
            .map(|(emotion, words)| {
                (
                    *emotion,
                    words.iter().filter_map(|w| keyword_pattern(w)).collect(),
                )
            })
            .collect();
        Self {
            patterns,
            cache: Cache::new(1_024),
        }
    }

    /// Keyword-match count for every emotion with at least one match.
    pub fn scores(&self, text: &str) -> Vec<(Emotion, usize)> {
        self.patterns
            .iter()
            .map(|(emotion, regexes)| {
                let count = regexes.iter().map(|r| r.find_iter(text).count()).sum();
                (*emotion, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// The emotion with the highest match count, if any keyword matched.
    pub fn detect(&self, text: &str) -> Option<Emotion> {
        if let Some(cached) = self.cache.get(text) {
            return cached;
        }

        let mut best: Option<(Emotion, usize)> = None;
        for (emotion, count) in self.scores(text) {
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((emotion, count));
            }
        }
        let detected = best.map(|(emotion, _)| emotion);

        debug!("Emotion for '{}': {:?}", text, detected);
        self.cache.insert(text.to_string(), detected);
        detected
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for EmotionDetector {
    fn default() -> Self {
        Self::new(&EmotionLexicon::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_category_match() {
        let detector = EmotionDetector::default();
        assert_eq!(detector.detect("I am so happy today"), Some(Emotion::Happy));
        assert_eq!(detector.detect("Hmm, let me think"), Some(Emotion::Thinking));
        assert_eq!(detector.detect("今日は本当に悲しい"), Some(Emotion::Sad));
    }

    #[test]
    fn test_no_match_returns_none() {
        let detector = EmotionDetector::default();
        assert_eq!(detector.detect("The weather report follows"), None);
    }

    #[test]
    fn test_highest_count_wins() {
        let detector = EmotionDetector::default();
        // One sad keyword, two happy ones.
        assert_eq!(
            detector.detect("Sorry, but I'm glad and happy"),
            Some(Emotion::Happy)
        );
    }

    #[test]
    fn test_ties_go_to_lexicon_order() {
        let detector = EmotionDetector::default();
        assert_eq!(detector.detect("happy but angry"), Some(Emotion::Happy));
    }

    #[test]
    fn test_word_boundaries_for_ascii_keywords() {
        let detector = EmotionDetector::default();
        // "yesterday" must not count as "yes", "madness" not as "mad".
        assert_eq!(detector.detect("yesterday was madness"), None);
        assert_eq!(detector.detect("Really? That is new"), Some(Emotion::Surprised));
    }

    #[test]
    fn test_case_insensitive() {
        let detector = EmotionDetector::default();
        assert_eq!(detector.detect("WOW"), Some(Emotion::Surprised));
    }

    #[test]
    fn test_results_are_cached_per_text() {
        let detector = EmotionDetector::default();
        detector.detect("I love it");
        detector.detect("I love it");
        detector.detect("plain");
        assert_eq!(detector.cached_entries(), 2);
    }

    #[test]
    fn test_custom_lexicon_from_map() {
        let mut map = HashMap::new();
        map.insert(Emotion::Angry, vec!["grr".to_string()]);
        let detector = EmotionDetector::new(&EmotionLexicon::from_map(&map));
        assert_eq!(detector.detect("grr!"), Some(Emotion::Angry));
        assert_eq!(detector.detect("happy"), None);
    }

    #[test]
    fn test_parse_round_trip() {
        for emotion in Emotion::ALL {
            assert_eq!(Emotion::parse(emotion.as_str()), Some(emotion));
        }
        assert_eq!(Emotion::parse(" Happy "), Some(Emotion::Happy));
        assert_eq!(Emotion::parse("bored"), None);
    }
}
