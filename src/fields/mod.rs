//! Field model: field ids, weights and stored-content strategies
//!
//! Fields are fixed when an index is built. Every field gets a dense id
//! below 128 (the postings format reserves the high bit of the field byte),
//! and the weights of all fields must sum to 1.0. Fields with weight 0 are
//! stored for display but never indexed.

mod field_info;
mod store;

pub use field_info::*;
pub use store::*;
