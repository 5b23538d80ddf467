use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::fields::{FieldConfig, StorageKind};

/// Maximum byte length of an indexed term; longer terms are dropped
pub const MAX_TERM_LEN: usize = 255;

/// Maximum byte size of one postings block (limit of a 2-byte length field)
pub const DEFAULT_PL_LIMIT: usize = 65_535;

/// Shared prefixes of this many chars or fewer are never front-coded
pub const FRONT_CODING_MIN_PREFIX: usize = 3;

/// Tokenizer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
    pub language: String,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: false,
            stem: false,
            min_token_length: 1,
            max_token_length: MAX_TERM_LEN,
            language: "english".to_string(),
        }
    }
}

/// Serialization target for the per-document normalization factors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocInfoFormat {
    /// `docInfo`: little-endian f64 array
    #[default]
    Binary,
    /// `docInfo.txt`: one comma-separated line per document
    Text,
}

impl DocInfoFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            DocInfoFormat::Binary => "docInfo",
            DocInfoFormat::Text => "docInfo.txt",
        }
    }
}

/// Indexer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default = "default_num_docs_per_store")]
    pub num_docs_per_store: u32,
    #[serde(default = "default_pl_limit")]
    pub pl_limit: usize,
    /// Blocks holding a term found in at least this share of documents are
    /// listed for eager client-side caching
    #[serde(default = "default_pl_cache_doc_freq_ratio")]
    pub pl_cache_doc_freq_ratio: f64,
    #[serde(default)]
    pub doc_info_format: DocInfoFormat,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default = "default_front_coding_min_prefix")]
    pub front_coding_min_prefix: usize,
    /// Field that receives the whole file for plain text sources
    #[serde(default = "default_text_field")]
    pub plain_text_field: String,
}

fn default_fields() -> Vec<FieldConfig> {
    vec![
        FieldConfig::new("title", 0.2, StorageKind::JsonSliced),
        FieldConfig::new("heading", 0.3, StorageKind::JsonSliced),
        FieldConfig::new("body", 0.5, StorageKind::JsonSliced),
        FieldConfig::new("headingLink", 0.0, StorageKind::JsonSliced),
        FieldConfig::new("link", 0.0, StorageKind::Single),
    ]
}

fn default_num_docs_per_store() -> u32 {
    8
}

fn default_pl_limit() -> usize {
    DEFAULT_PL_LIMIT
}

fn default_pl_cache_doc_freq_ratio() -> f64 {
    0.5
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_front_coding_min_prefix() -> usize {
    FRONT_CODING_MIN_PREFIX
}

fn default_text_field() -> String {
    "body".to_string()
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            tokenizer: TokenizerConfig::default(),
            num_docs_per_store: default_num_docs_per_store(),
            pl_limit: default_pl_limit(),
            pl_cache_doc_freq_ratio: default_pl_cache_doc_freq_ratio(),
            doc_info_format: DocInfoFormat::default(),
            num_threads: default_num_threads(),
            front_coding_min_prefix: default_front_coding_min_prefix(),
            plain_text_field: default_text_field(),
        }
    }
}

impl IndexingConfig {
    /// Load an indexing configuration from a JSON file; missing keys use defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn with_fields(mut self, fields: Vec<FieldConfig>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizerConfig) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads.max(1);
        self
    }

    pub fn with_pl_limit(mut self, pl_limit: usize) -> Self {
        self.pl_limit = pl_limit;
        self
    }

    pub fn with_doc_info_format(mut self, format: DocInfoFormat) -> Self {
        self.doc_info_format = format;
        self
    }
}

/// Query engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearcherConfig {
    pub max_term_expansions: usize,
    /// Weight multiplier applied to expanded (non-primary) terms
    pub expansion_weight: f32,
    pub max_edit_distance: usize,
    pub max_excerpt_len: usize,
    /// Characters of context emitted on each side of a highlighted match
    pub excerpt_context: usize,
    pub max_excerpts_per_doc: usize,
    pub max_concurrent_fetches: usize,
    pub heading_field: String,
    pub heading_link_field: String,
    pub body_field: String,
}

impl Default for SearcherConfig {
    fn default() -> Self {
        Self {
            max_term_expansions: 3,
            expansion_weight: 0.8,
            max_edit_distance: 2,
            max_excerpt_len: 250,
            excerpt_context: 40,
            max_excerpts_per_doc: 3,
            max_concurrent_fetches: 2,
            heading_field: "heading".to_string(),
            heading_link_field: "headingLink".to_string(),
            body_field: "body".to_string(),
        }
    }
}

impl SearcherConfig {
    pub fn with_max_term_expansions(mut self, n: usize) -> Self {
        self.max_term_expansions = n;
        self
    }

    pub fn with_max_excerpt_len(mut self, len: usize) -> Self {
        self.max_excerpt_len = len;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let tokenizer_config = TokenizerConfig::default();
        assert!(tokenizer_config.lowercase);
        assert!(!tokenizer_config.stem);
        assert_eq!(tokenizer_config.max_token_length, MAX_TERM_LEN);

        let indexing = IndexingConfig::default();
        assert_eq!(indexing.pl_limit, 65_535);
        assert_eq!(indexing.front_coding_min_prefix, 3);
        let weight_sum: f32 = indexing.fields.iter().map(|f| f.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-6);

        let searcher = SearcherConfig::default();
        assert_eq!(searcher.max_concurrent_fetches, 2);
        assert_eq!(searcher.excerpt_context, 40);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: IndexingConfig =
            serde_json::from_str(r#"{ "num_docs_per_store": 2, "doc_info_format": "text" }"#)
                .unwrap();
        assert_eq!(config.num_docs_per_store, 2);
        assert_eq!(config.doc_info_format, DocInfoFormat::Text);
        assert_eq!(config.fields.len(), 5);
        assert_eq!(config.doc_info_format.file_name(), "docInfo.txt");
    }

    #[test]
    fn test_builder() {
        let config = IndexingConfig::default()
            .with_num_threads(0)
            .with_pl_limit(128);
        assert_eq!(config.num_threads, 1);
        assert_eq!(config.pl_limit, 128);
    }
}
