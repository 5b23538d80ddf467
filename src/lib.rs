pub mod codec;
pub mod config;
pub mod error;
pub mod fields;
pub mod indexer;
pub mod manifest;
pub mod scoring;
pub mod searcher;
pub mod tokenizer;

pub use config::{DocInfoFormat, IndexingConfig, SearcherConfig, TokenizerConfig};
pub use error::{MorselError, Result};
pub use fields::{FieldConfig, FieldInfos, StorageKind};
pub use indexer::{IndexSummary, IndexWriter, LoadedDocument};
pub use manifest::IndexManifest;
pub use searcher::{
    FsStore, IndexStore, MemoryCache, MemoryStore, Query, SearchResult, SearchWorker, Searcher,
};
pub use tokenizer::Tokenizer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
