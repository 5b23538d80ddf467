//! Offline indexer
//!
//! Source files go through a [`DocumentLoader`], get sequential doc ids and
//! are mined in parallel into a [`PostingsAccumulator`]. The dump writes the
//! dictionary, the postings blocks, the normalization factors and the field
//! store. Incremental runs reload the previous index first and only mine
//! what changed.

mod accumulator;
mod incremental;
mod loader;
mod miner;
mod writer;

pub use accumulator::{calc_normalization_factors, DumpOutput, DumpParams, PostingsAccumulator};
pub use incremental::{
    classify, Classification, FileIdentity, FileProbe, FileRecord, FileStat, FileStatus,
    IncrementalInfo, LinkRecord,
};
pub use loader::{DocumentLoader, JsonLoader, LoadedDocument, PlainTextLoader};
pub use miner::{mine_document, mine_parallel, MiningJob};
pub use writer::{IndexSummary, IndexWriter};
