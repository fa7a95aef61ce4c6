//! Phonetic wake word matching
//!
//! Transcripts are romanised to tone-numbered pinyin before comparison, so a
//! wake phrase matches however the recogniser chose to write it (homophone
//! characters, stray spaces, Latin letters).

use pinyin::ToPinyin;

/// Romanise text for phonetic comparison
///
/// Han characters become tone-numbered pinyin (`狗` → `gou3`), other
/// letters and digits are lowercased, and whitespace and punctuation are
/// dropped.
#[must_use]
pub fn romanize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if let Some(p) = c.to_pinyin() {
            out.push_str(p.with_tone_num_end());
        } else if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Matches configured wake phrases against transcripts
#[derive(Debug, Clone)]
pub struct WakeWordMatcher {
    wake_words: Vec<String>,
}

impl WakeWordMatcher {
    /// Create a matcher
    ///
    /// # Arguments
    ///
    /// * `wake_words` - phrases in pinyin with tone numbers (`xiao3gou3`) or
    ///   in Han characters (`小狗`); both are romanised on construction
    #[must_use]
    pub fn new(wake_words: Vec<String>) -> Self {
        let normalized: Vec<String> = wake_words
            .iter()
            .map(String::as_str)
            .map(romanize)
            .filter(|w| !w.is_empty())
            .collect();

        tracing::debug!(wake_words = ?normalized, "wake word matcher initialized");

        Self {
            wake_words: normalized,
        }
    }

    /// Return the first wake phrase found in `transcript`
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<&str> {
        if self.wake_words.is_empty() {
            return None;
        }
        let romanized = romanize(transcript);
        self.wake_words
            .iter()
            .find(|w| romanized.contains(w.as_str()))
            .map(String::as_str)
    }

    /// Whether `transcript` contains any wake phrase
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        self.find(transcript).is_some()
    }

    /// Normalised wake phrases
    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }
}
