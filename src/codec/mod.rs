//! Binary index formats shared by the indexer (encode) and the query
//! engine (decode)
//!
//! - `varint`: variable-byte integers, high bit marks the last byte
//! - `dictionary`: front-coded term strings plus the fixed-layout term table
//! - `postings`: impact-ordered per-term postings inside size-bounded blocks
//! - `doc_info`: per-document normalization factors
//! - `deleted_docs`: tombstoned document ids

mod varint;
mod dictionary;
mod postings;
mod doc_info;
mod deleted_docs;

pub use varint::*;
pub use dictionary::*;
pub use postings::*;
pub use doc_info::*;
pub use deleted_docs::*;
