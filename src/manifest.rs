//! Index manifest (`morsel_config.json`) and the file names of an index
//!
//! The manifest is written last, through a temp file and a rename, so a
//! reader never sees a manifest that points at files not yet written.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{DocInfoFormat, TokenizerConfig};
use crate::error::{MorselError, Result};
use crate::fields::FieldInfos;

/// On-disk format version; the searcher refuses any other value
pub const INDEX_FORMAT_VERSION: &str = "1";

pub const CONFIG_FILE: &str = "morsel_config.json";
pub const FIELD_INFO_FILE: &str = "fieldInfo.json";
pub const DICTIONARY_STRING_FILE: &str = "dictionaryString";
pub const DICTIONARY_TABLE_FILE: &str = "dictionaryTable";
pub const DELETED_DOCS_FILE: &str = "deletedDocs";
pub const INCREMENTAL_INFO_FILE: &str = "morsel_incremental_info.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexManifest {
    pub ver: String,
    /// Content key of this build; changes whenever the dictionary, the
    /// tombstones or the document count change
    pub index_ver: String,
    pub lang: TokenizerConfig,
    pub field_infos: FieldInfos,
    pub num_docs: u32,
    pub num_docs_per_store: u32,
    pub num_pls: u32,
    pub pl_limit: usize,
    /// Postings blocks worth caching eagerly on the client
    pub pl_names_to_cache: Vec<u32>,
    pub doc_info_format: DocInfoFormat,
}

impl IndexManifest {
    /// Content key from the dictionary streams, the tombstone set and the
    /// document count
    pub fn compute_index_ver(strings: &[u8], table: &[u8], deleted: &[u8], num_docs: u32) -> String {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(strings);
        hasher.update(table);
        hasher.update(deleted);
        hasher.update(&num_docs.to_le_bytes());
        format!("{:08x}-{}", hasher.finalize(), num_docs)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a manifest, failing on a format version this build cannot read
    pub fn from_json(data: &[u8]) -> Result<Self> {
        #[derive(Deserialize)]
        struct FormatVersion {
            ver: String,
        }

        let header: FormatVersion = serde_json::from_slice(data)?;
        if header.ver != INDEX_FORMAT_VERSION {
            return Err(MorselError::VersionMismatch {
                expected: INDEX_FORMAT_VERSION.to_string(),
                found: header.ver,
            });
        }
        Ok(serde_json::from_slice(data)?)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read(dir.join(CONFIG_FILE))?)
    }

    /// Write through `morsel_config.json.tmp` and rename into place
    pub fn save(&self, dir: &Path) -> Result<()> {
        write_atomic(dir, CONFIG_FILE, &self.to_json()?)
    }
}

/// Replace `dir/name` with `data` via a sibling temp file
pub fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> Result<()> {
    let tmp = dir.join(format!("{}.tmp", name));
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, dir.join(name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use tempfile::TempDir;

    fn manifest() -> IndexManifest {
        let config = IndexingConfig::default();
        IndexManifest {
            ver: INDEX_FORMAT_VERSION.to_string(),
            index_ver: IndexManifest::compute_index_ver(b"abc", b"def", b"", 2),
            lang: config.tokenizer.clone(),
            field_infos: FieldInfos::new(&config.fields).unwrap(),
            num_docs: 2,
            num_docs_per_store: 8,
            num_pls: 1,
            pl_limit: 65_535,
            pl_names_to_cache: vec![0],
            doc_info_format: DocInfoFormat::Binary,
        }
    }

    #[test]
    fn test_manifest_save_load() {
        let tmp = TempDir::new().unwrap();
        let original = manifest();
        original.save(tmp.path()).unwrap();
        assert!(!tmp.path().join("morsel_config.json.tmp").exists());

        let loaded = IndexManifest::load(tmp.path()).unwrap();
        assert_eq!(loaded.index_ver, original.index_ver);
        assert_eq!(loaded.field_infos.num_fields(), 5);
        assert_eq!(loaded.pl_names_to_cache, vec![0]);
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let mut json: serde_json::Value =
            serde_json::from_slice(&manifest().to_json().unwrap()).unwrap();
        json["ver"] = serde_json::Value::String("0".to_string());
        let err = IndexManifest::from_json(&serde_json::to_vec(&json).unwrap()).unwrap_err();
        assert!(matches!(err, MorselError::VersionMismatch { .. }));
        assert!(err.is_fatal_for_index());
    }

    #[test]
    fn test_index_ver_tracks_content() {
        let a = IndexManifest::compute_index_ver(b"abc", b"def", b"", 2);
        assert_eq!(a, IndexManifest::compute_index_ver(b"abc", b"def", b"", 2));
        assert_ne!(a, IndexManifest::compute_index_ver(b"abd", b"def", b"", 2));
        assert_ne!(a, IndexManifest::compute_index_ver(b"abc", b"def", b"", 3));
        assert_ne!(a, IndexManifest::compute_index_ver(b"abc", b"def", b"\x01", 2));
    }
}
