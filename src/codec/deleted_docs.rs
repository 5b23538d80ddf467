//! `deletedDocs`: roaring bitmap of tombstoned document ids

use roaring::RoaringBitmap;

use crate::error::{MorselError, Result};

pub fn encode_deleted_docs(deleted: &RoaringBitmap) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(deleted.serialized_size());
    deleted.serialize_into(&mut out)?;
    Ok(out)
}

/// Decode the bitmap; an empty input is an empty set
pub fn decode_deleted_docs(input: &[u8]) -> Result<RoaringBitmap> {
    if input.is_empty() {
        return Ok(RoaringBitmap::new());
    }
    RoaringBitmap::deserialize_from(input)
        .map_err(|e| MorselError::format(format!("deletedDocs: {}", e)))
}
