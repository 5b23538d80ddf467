//! Query engine
//!
//! Reads an index through an async [`IndexStore`], so the same engine
//! serves a local directory or any byte-range capable remote store. Only
//! the dictionary, normalization factors and tombstones are loaded up
//! front; postings and stored fields are fetched per query, at most
//! `max_concurrent_fetches` at a time.

mod dictionary;
mod evaluate;
mod highlight;
mod preprocess;
mod query;
mod query_part;
pub mod query_string;
mod searcher;
mod storage;
mod worker;

pub use dictionary::{levenshtein_distance, Dictionary};
pub use evaluate::DocScores;
pub use highlight::{
    best_window, build_excerpt, highlight_document, Excerpt, HighlightedExcerpt, MatchWindow,
    TermMatcher,
};
pub use preprocess::preprocess;
pub use query::{Query, SearchResult};
pub use query_part::{ExpandedTerm, QueryPart, QueryPartKind};
pub use searcher::{LoadedIndex, Searcher, SharedIndex};
pub use storage::{BlockCache, BoundedFetcher, FsStore, IndexStore, MemoryCache, MemoryStore};
pub use worker::{SearchResponse, SearchWorker};
