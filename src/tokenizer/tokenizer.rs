use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use stop_words::{get, LANGUAGE};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{TokenizerConfig, MAX_TERM_LEN};

/// Position distance inserted between sentences so phrase and proximity
/// matches never span a sentence boundary
pub const SENTENCE_POSITION_GAP: u32 = 10;

/// Text tokenizer with sentence-aware positions, optional stemming and
/// stopword removal
pub struct Tokenizer {
    config: TokenizerConfig,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<String>,
}

impl Tokenizer {
    /// Create a new tokenizer from configuration
    pub fn new(config: &TokenizerConfig) -> Self {
        let stemmer = if config.stem {
            Some(Stemmer::create(Algorithm::English))
        } else {
            None
        };

        let stopwords = if config.remove_stopwords {
            get(LANGUAGE::English)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect()
        } else {
            HashSet::new()
        };

        // Terms past the dictionary's one-byte length field are never indexed
        let mut config = config.clone();
        config.max_token_length = config.max_token_length.min(MAX_TERM_LEN);

        Self {
            config,
            stemmer,
            stopwords,
        }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Normalize one raw word into an index term.
    ///
    /// Returns `None` when the word is empty after punctuation stripping,
    /// outside the configured length bounds, or a stopword.
    pub fn normalize(&self, word: &str) -> Option<String> {
        let mut token: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if self.config.lowercase {
            token = token.to_lowercase();
        }

        if token.is_empty()
            || token.chars().count() < self.config.min_token_length
            || token.len() > self.config.max_token_length
        {
            return None;
        }

        if self.stopwords.contains(&token) {
            return None;
        }

        match &self.stemmer {
            Some(stemmer) => Some(stemmer.stem(&token).to_string()),
            None => Some(token),
        }
    }

    /// Tokenize text into a vector of terms
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenize_with_positions_ordered(text)
            .into_iter()
            .map(|(term, _)| term)
            .collect()
    }

    /// Tokenize and return (term, position) pairs in order
    ///
    /// Dropped words (stopwords, overlong terms) still consume a position.
    /// Each new sentence starts `SENTENCE_POSITION_GAP` positions after the
    /// previous one ended.
    pub fn tokenize_with_positions_ordered(&self, text: &str) -> Vec<(String, u32)> {
        let mut results = Vec::new();
        let mut pos = 0u32;

        for (sentence_idx, sentence) in text.unicode_sentences().enumerate() {
            if sentence_idx > 0 {
                pos += SENTENCE_POSITION_GAP;
            }

            for word in sentence.unicode_words() {
                if let Some(token) = self.normalize(word) {
                    results.push((token, pos));
                }
                pos += 1;
            }
        }

        results
    }

    /// Tokenize text and group positions by term
    pub fn tokenize_with_positions(&self, text: &str) -> HashMap<String, Vec<u32>> {
        let mut positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (term, pos) in self.tokenize_with_positions_ordered(text) {
            positions.entry(term).or_default().push(pos);
        }
        positions
    }
}
