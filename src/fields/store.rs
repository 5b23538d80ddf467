//! Stored field content, sharded by document id
//!
//! `field_store/<shard>.json` holds `num_docs_per_store` consecutive
//! documents. Each document is an array of `[field_id, text]` pairs in the
//! order the values appeared in the source.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use super::field_info::StoredField;
use crate::error::Result;

pub const FIELD_STORE_DIR: &str = "field_store";

/// Documents of one shard, indexed by `doc_id % num_docs_per_store`
pub type FieldStoreShard = Vec<Vec<StoredField>>;

/// Relative file name of the shard holding `doc_id`
pub fn shard_name(doc_id: u32, num_docs_per_store: u32) -> String {
    format!("{}/{}.json", FIELD_STORE_DIR, doc_id / num_docs_per_store.max(1))
}

/// Parse a shard and pick out one document; missing slots are empty
pub fn document_from_shard(
    data: &[u8],
    doc_id: u32,
    num_docs_per_store: u32,
) -> Result<Vec<StoredField>> {
    let shard: FieldStoreShard = serde_json::from_slice(data)?;
    let slot = (doc_id % num_docs_per_store.max(1)) as usize;
    Ok(shard.get(slot).cloned().unwrap_or_default())
}

/// Buffers stored documents and writes them shard by shard
pub struct FieldStoreWriter {
    dir: PathBuf,
    num_docs_per_store: u32,
    pending: BTreeMap<u32, BTreeMap<usize, Vec<StoredField>>>,
}

impl FieldStoreWriter {
    pub fn new(output_dir: &Path, num_docs_per_store: u32) -> Self {
        Self {
            dir: output_dir.join(FIELD_STORE_DIR),
            num_docs_per_store: num_docs_per_store.max(1),
            pending: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, doc_id: u32, fields: Vec<StoredField>) {
        let shard = doc_id / self.num_docs_per_store;
        let slot = (doc_id % self.num_docs_per_store) as usize;
        self.pending.entry(shard).or_default().insert(slot, fields);
    }

    pub fn pending_docs(&self) -> usize {
        self.pending.values().map(|s| s.len()).sum()
    }

    /// Write every touched shard.
    ///
    /// Shards that already exist on disk (from a previous run) are merged
    /// so documents outside this run keep their content.
    pub fn flush(&mut self) -> Result<usize> {
        std::fs::create_dir_all(&self.dir)?;
        let mut written = 0;

        for (shard, docs) in std::mem::take(&mut self.pending) {
            let path = self.dir.join(format!("{}.json", shard));
            let mut contents: FieldStoreShard = match std::fs::read(&path) {
                Ok(data) => serde_json::from_slice(&data)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            };

            for (slot, fields) in docs {
                if contents.len() <= slot {
                    contents.resize(slot + 1, Vec::new());
                }
                contents[slot] = fields;
            }

            std::fs::write(&path, serde_json::to_vec(&contents)?)?;
            written += 1;
        }

        Ok(written)
    }
}
