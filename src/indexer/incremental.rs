//! Incremental run bookkeeping: file identities, link tracking and the
//! classification of every source file against the previous run

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What a source file looked like when it was last indexed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdentity {
    pub mtime_ms: u64,
    pub len: u64,
    pub crc32: u32,
}

impl FileIdentity {
    pub fn from_contents(mtime_ms: u64, contents: &[u8]) -> Self {
        Self {
            mtime_ms,
            len: contents.len() as u64,
            crc32: crc32fast::hash(contents),
        }
    }

    /// Cheap check that needs no file read
    pub fn same_stat(&self, other: &FileIdentity) -> bool {
        self.mtime_ms == other.mtime_ms && self.len == other.len
    }

    pub fn same_content(&self, other: &FileIdentity) -> bool {
        self.len == other.len && self.crc32 == other.crc32
    }
}

/// Stat-only view of a file on disk; the checksum is read lazily
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub mtime_ms: u64,
    pub len: u64,
}

impl FileStat {
    pub fn read(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(Self {
            mtime_ms,
            len: meta.len(),
        })
    }
}

/// One indexed source file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub identity: Option<FileIdentity>,
    pub doc_ids: Vec<u32>,
    /// Every link target of this file's documents
    #[serde(default)]
    pub links: Vec<String>,
    /// Link targets that did not exist when the file was mined
    #[serde(default)]
    pub unresolved_links: Vec<String>,
}

/// A secondary file folded into one or more owners
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub identity: Option<FileIdentity>,
    #[serde(default)]
    pub owners: Vec<String>,
}

/// `morsel_incremental_info.json`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalInfo {
    pub num_deleted_docs: u64,
    #[serde(default)]
    pub next_doc_id: u32,
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    pub links: BTreeMap<String, LinkRecord>,
    /// Deleted link targets whose owners could not be recovered; owners
    /// linking them are re-mined on the next run
    #[serde(default)]
    pub pending_relinks: BTreeSet<String>,
}

impl IncrementalInfo {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Unchanged,
    Added,
    Updated,
    Deleted,
}

/// Current view of one source or link-target file
pub trait FileProbe {
    fn stat(&self, path: &str) -> Option<FileStat>;

    fn identity(&self, path: &str) -> Option<FileIdentity>;
}

/// Outcome of comparing the current source tree with the previous run
#[derive(Clone, Debug, Default)]
pub struct Classification {
    pub statuses: BTreeMap<String, FileStatus>,
    /// Link targets deleted this run whose owners are unknown
    pub new_pending_relinks: BTreeSet<String>,
}

impl Classification {
    pub fn files_with(&self, status: FileStatus) -> impl Iterator<Item = &str> {
        self.statuses
            .iter()
            .filter(move |(_, s)| **s == status)
            .map(|(path, _)| path.as_str())
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.files_with(status).count()
    }
}

fn unchanged(previous: Option<FileIdentity>, path: &str, probe: &dyn FileProbe) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    match probe.stat(path) {
        None => false,
        Some(stat) if stat.mtime_ms == previous.mtime_ms && stat.len == previous.len => true,
        Some(_) => probe
            .identity(path)
            .map(|current| current.same_content(&previous))
            .unwrap_or(false),
    }
}

/// Classify every file of `current` (sorted relative paths) against `info`.
///
/// Beyond plain identity changes, an owner turns into an update when:
/// - one of its link targets changed or disappeared,
/// - a link target that was missing before now exists,
/// - it links a target recorded in `pending_relinks` by the previous run.
pub fn classify(
    info: &IncrementalInfo,
    current: &BTreeSet<String>,
    probe: &dyn FileProbe,
) -> Classification {
    let mut result = Classification::default();

    for path in current {
        let status = match info.files.get(path) {
            None => FileStatus::Added,
            Some(record) if !unchanged(record.identity, path, probe) => FileStatus::Updated,
            Some(_) => FileStatus::Unchanged,
        };
        result.statuses.insert(path.clone(), status);
    }
    for path in info.files.keys() {
        if !current.contains(path) {
            result.statuses.insert(path.clone(), FileStatus::Deleted);
        }
    }

    let mut relink: BTreeSet<String> = BTreeSet::new();

    for (target, link) in &info.links {
        let exists = probe.stat(target).is_some();
        let changed = !exists || !unchanged(link.identity, target, probe);
        if !changed {
            continue;
        }
        let live_owners: Vec<&String> = link
            .owners
            .iter()
            .filter(|o| info.files.contains_key(o.as_str()))
            .collect();
        if !exists && live_owners.is_empty() {
            result.new_pending_relinks.insert(target.clone());
        }
        relink.extend(live_owners.into_iter().cloned());
    }

    for (owner, record) in &info.files {
        let satisfied = record
            .unresolved_links
            .iter()
            .any(|target| probe.stat(target).is_some());
        let pending = record
            .links
            .iter()
            .any(|target| info.pending_relinks.contains(target));
        if satisfied || pending {
            relink.insert(owner.clone());
        }
    }

    for owner in relink {
        if let Some(status) = result.statuses.get_mut(&owner) {
            if *status == FileStatus::Unchanged {
                *status = FileStatus::Updated;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeFs {
        files: HashMap<String, (u64, Vec<u8>)>,
    }

    impl FakeFs {
        fn put(&mut self, path: &str, mtime_ms: u64, contents: &str) {
            self.files
                .insert(path.to_string(), (mtime_ms, contents.as_bytes().to_vec()));
        }

        fn identity_of(&self, path: &str) -> Option<FileIdentity> {
            self.identity(path)
        }
    }

    impl FileProbe for FakeFs {
        fn stat(&self, path: &str) -> Option<FileStat> {
            self.files.get(path).map(|(mtime_ms, data)| FileStat {
                mtime_ms: *mtime_ms,
                len: data.len() as u64,
            })
        }

        fn identity(&self, path: &str) -> Option<FileIdentity> {
            self.files
                .get(path)
                .map(|(mtime_ms, data)| FileIdentity::from_contents(*mtime_ms, data))
        }
    }

    fn record(fs: &FakeFs, path: &str, doc_ids: Vec<u32>) -> FileRecord {
        FileRecord {
            identity: fs.identity_of(path),
            doc_ids,
            links: Vec::new(),
            unresolved_links: Vec::new(),
        }
    }

    fn current(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_basic_transitions() {
        let mut fs = FakeFs::default();
        fs.put("same.txt", 1, "same");
        fs.put("edited.txt", 1, "before");
        fs.put("gone.txt", 1, "bye");

        let mut info = IncrementalInfo::default();
        for (i, p) in ["same.txt", "edited.txt", "gone.txt"].iter().enumerate() {
            info.files.insert(p.to_string(), record(&fs, p, vec![i as u32]));
        }

        fs.put("edited.txt", 2, "after!");
        fs.put("new.txt", 2, "new");
        fs.files.remove("gone.txt");

        let result = classify(&info, &current(&["edited.txt", "new.txt", "same.txt"]), &fs);
        assert_eq!(result.statuses["same.txt"], FileStatus::Unchanged);
        assert_eq!(result.statuses["edited.txt"], FileStatus::Updated);
        assert_eq!(result.statuses["new.txt"], FileStatus::Added);
        assert_eq!(result.statuses["gone.txt"], FileStatus::Deleted);
    }

    #[test]
    fn test_touch_without_content_change_is_unchanged() {
        let mut fs = FakeFs::default();
        fs.put("a.txt", 1, "content");
        let mut info = IncrementalInfo::default();
        info.files.insert("a.txt".to_string(), record(&fs, "a.txt", vec![0]));

        fs.put("a.txt", 99, "content");
        let result = classify(&info, &current(&["a.txt"]), &fs);
        assert_eq!(result.statuses["a.txt"], FileStatus::Unchanged);
    }

    #[test]
    fn test_satisfied_link_updates_owner() {
        let mut fs = FakeFs::default();
        fs.put("owner.json", 1, "{}");
        let mut info = IncrementalInfo::default();
        let mut owner = record(&fs, "owner.json", vec![0]);
        owner.links = vec!["extra.txt".to_string()];
        owner.unresolved_links = vec!["extra.txt".to_string()];
        info.files.insert("owner.json".to_string(), owner);

        let result = classify(&info, &current(&["owner.json"]), &fs);
        assert_eq!(result.statuses["owner.json"], FileStatus::Unchanged);

        fs.put("extra.txt", 2, "now here");
        let result = classify(&info, &current(&["owner.json"]), &fs);
        assert_eq!(result.statuses["owner.json"], FileStatus::Updated);
    }

    #[test]
    fn test_changed_or_deleted_link_updates_known_owner() {
        let mut fs = FakeFs::default();
        fs.put("owner.json", 1, "{}");
        fs.put("extra.txt", 1, "linked");
        let mut info = IncrementalInfo::default();
        let mut owner = record(&fs, "owner.json", vec![0]);
        owner.links = vec!["extra.txt".to_string()];
        info.files.insert("owner.json".to_string(), owner);
        info.links.insert(
            "extra.txt".to_string(),
            LinkRecord {
                identity: fs.identity_of("extra.txt"),
                owners: vec!["owner.json".to_string()],
            },
        );

        fs.put("extra.txt", 2, "linked, edited");
        let result = classify(&info, &current(&["owner.json"]), &fs);
        assert_eq!(result.statuses["owner.json"], FileStatus::Updated);

        fs.files.remove("extra.txt");
        let result = classify(&info, &current(&["owner.json"]), &fs);
        assert_eq!(result.statuses["owner.json"], FileStatus::Updated);
        assert!(result.new_pending_relinks.is_empty());
    }

    #[test]
    fn test_orphaned_deleted_link_is_forced_next_run() {
        let mut fs = FakeFs::default();
        fs.put("owner.json", 1, "{}");
        fs.put("extra.txt", 1, "linked");
        let mut info = IncrementalInfo::default();
        let mut owner = record(&fs, "owner.json", vec![0]);
        owner.links = vec!["extra.txt".to_string()];
        info.files.insert("owner.json".to_string(), owner);
        // Owner metadata lost for this link
        info.links.insert(
            "extra.txt".to_string(),
            LinkRecord {
                identity: fs.identity_of("extra.txt"),
                owners: vec![],
            },
        );

        fs.files.remove("extra.txt");
        let result = classify(&info, &current(&["owner.json"]), &fs);
        assert_eq!(result.statuses["owner.json"], FileStatus::Unchanged);
        assert!(result.new_pending_relinks.contains("extra.txt"));

        info.links.remove("extra.txt");
        info.pending_relinks = result.new_pending_relinks;
        let result = classify(&info, &current(&["owner.json"]), &fs);
        assert_eq!(result.statuses["owner.json"], FileStatus::Updated);
    }

    #[test]
    fn test_info_json_roundtrip() {
        let mut info = IncrementalInfo {
            num_deleted_docs: 3,
            next_doc_id: 9,
            ..Default::default()
        };
        info.files.insert("a.txt".to_string(), FileRecord::default());
        info.pending_relinks.insert("gone.txt".to_string());
        let restored = IncrementalInfo::from_json(&info.to_json().unwrap()).unwrap();
        assert_eq!(restored, info);

        let minimal = IncrementalInfo::from_json(br#"{"num_deleted_docs": 4}"#).unwrap();
        assert_eq!(minimal.num_deleted_docs, 4);
    }
}
