//! Index writer: full and incremental runs over a source directory

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use roaring::RoaringBitmap;
use tracing::{debug, info, warn};

use super::accumulator::{DumpParams, PostingsAccumulator};
use super::incremental::{
    classify, FileIdentity, FileProbe, FileRecord, FileStat, FileStatus, IncrementalInfo,
    LinkRecord,
};
use super::loader::{DocumentLoader, JsonLoader, LoadedDocument, PlainTextLoader};
use super::miner::{mine_parallel, MiningJob};
use crate::codec::{
    decode_deleted_docs, decode_dictionary, decode_term_postings, encode_deleted_docs,
    pl_file_name,
};
use crate::config::{DocInfoFormat, IndexingConfig, MAX_TERM_LEN};
use crate::error::{MorselError, Result};
use crate::fields::{FieldInfos, FieldStoreWriter, FIELD_STORE_DIR};
use crate::manifest::{
    write_atomic, IndexManifest, CONFIG_FILE, DELETED_DOCS_FILE, DICTIONARY_STRING_FILE,
    DICTIONARY_TABLE_FILE, FIELD_INFO_FILE, INCREMENTAL_INFO_FILE, INDEX_FORMAT_VERSION,
};

/// Counts reported after a run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexSummary {
    /// Document ids allocated so far, tombstoned ones included
    pub num_docs: u32,
    pub num_new_docs: usize,
    pub num_deleted_docs: u64,
    pub num_terms: usize,
    pub num_pls: u32,
    pub added_files: usize,
    pub updated_files: usize,
    pub deleted_files: usize,
    pub unchanged_files: usize,
    pub index_ver: String,
}

/// State carried from the previous run into this one
struct RunState {
    info: IncrementalInfo,
    deleted: RoaringBitmap,
    acc: PostingsAccumulator,
}

impl RunState {
    fn empty() -> Self {
        Self {
            info: IncrementalInfo::default(),
            deleted: RoaringBitmap::new(),
            acc: PostingsAccumulator::new(),
        }
    }
}

/// Stat and checksum probe over a source root
struct DirProbe<'a> {
    root: &'a Path,
}

impl FileProbe for DirProbe<'_> {
    fn stat(&self, path: &str) -> Option<FileStat> {
        let full = self.root.join(path);
        if !full.is_file() {
            return None;
        }
        FileStat::read(&full).ok()
    }

    fn identity(&self, path: &str) -> Option<FileIdentity> {
        let stat = self.stat(path)?;
        let contents = std::fs::read(self.root.join(path)).ok()?;
        Some(FileIdentity::from_contents(stat.mtime_ms, &contents))
    }
}

/// Builds an index directory from source files or in-memory documents
pub struct IndexWriter {
    config: IndexingConfig,
    field_infos: FieldInfos,
    loaders: Vec<Box<dyn DocumentLoader>>,
}

impl IndexWriter {
    /// Validate the field set and register the JSON and plain-text loaders
    pub fn new(mut config: IndexingConfig) -> Result<Self> {
        config.tokenizer.max_token_length = config.tokenizer.max_token_length.min(MAX_TERM_LEN);
        let field_infos = FieldInfos::new(&config.fields)?;
        let text_loader = PlainTextLoader::new(config.plain_text_field.clone());
        Ok(Self {
            config,
            field_infos,
            loaders: vec![Box::new(JsonLoader), Box::new(text_loader)],
        })
    }

    /// Register a loader ahead of the built-in ones
    pub fn with_loader(mut self, loader: Box<dyn DocumentLoader>) -> Self {
        self.loaders.insert(0, loader);
        self
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.field_infos
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// Rebuild `output_dir` from every file under `source_dir`
    pub fn build(&self, source_dir: &Path, output_dir: &Path) -> Result<IndexSummary> {
        self.run(source_dir, output_dir, false)
    }

    /// Apply the changes under `source_dir` since the last run.
    ///
    /// Falls back to a full build when `output_dir` holds no index yet.
    pub fn build_incremental(&self, source_dir: &Path, output_dir: &Path) -> Result<IndexSummary> {
        self.run(source_dir, output_dir, true)
    }

    /// Full build from documents that have no backing files
    pub fn build_from_documents(
        &self,
        docs: Vec<LoadedDocument>,
        output_dir: &Path,
    ) -> Result<IndexSummary> {
        std::fs::create_dir_all(output_dir)?;
        clear_index_files(output_dir)?;

        let mut state = RunState::empty();
        let mut store = FieldStoreWriter::new(output_dir, self.config.num_docs_per_store);
        let mut jobs = Vec::with_capacity(docs.len());
        for doc in docs {
            jobs.push(self.assign(&mut state.info, &mut store, doc.fields));
        }

        let mut summary = IndexSummary::default();
        self.finish(output_dir, state, store, &jobs, &mut summary)?;
        Ok(summary)
    }

    fn run(&self, source_dir: &Path, output_dir: &Path, incremental: bool) -> Result<IndexSummary> {
        std::fs::create_dir_all(output_dir)?;

        let resume = incremental && output_dir.join(CONFIG_FILE).exists();
        let mut state = if resume {
            self.load_previous(output_dir)?
        } else {
            clear_index_files(output_dir)?;
            RunState::empty()
        };

        let current = self.collect_sources(source_dir, output_dir)?;
        let probe = DirProbe { root: source_dir };
        let classification = classify(&state.info, &current, &probe);

        let mut summary = IndexSummary {
            added_files: classification.count(FileStatus::Added),
            updated_files: classification.count(FileStatus::Updated),
            deleted_files: classification.count(FileStatus::Deleted),
            unchanged_files: classification.count(FileStatus::Unchanged),
            ..Default::default()
        };
        info!(
            added = summary.added_files,
            updated = summary.updated_files,
            deleted = summary.deleted_files,
            unchanged = summary.unchanged_files,
            incremental = resume,
            "classified source files"
        );

        let mut store = FieldStoreWriter::new(output_dir, self.config.num_docs_per_store);

        // Tombstone everything that is going away or being replaced
        let mut newly_deleted = 0u64;
        for (path, status) in &classification.statuses {
            if !matches!(status, FileStatus::Updated | FileStatus::Deleted) {
                continue;
            }
            if let Some(record) = state.info.files.remove(path) {
                for doc_id in record.doc_ids {
                    if state.deleted.insert(doc_id) {
                        newly_deleted += 1;
                    }
                    store.add(doc_id, Vec::new());
                }
            }
        }
        state.info.num_deleted_docs += newly_deleted;

        let mut jobs = Vec::new();
        let mut link_identities: HashMap<String, FileIdentity> = HashMap::new();
        for (path, status) in &classification.statuses {
            if !matches!(status, FileStatus::Added | FileStatus::Updated) {
                continue;
            }
            let record = self.mine_file(
                source_dir,
                path,
                &mut state.info,
                &mut store,
                &mut jobs,
                &mut link_identities,
            )?;
            state.info.files.insert(path.clone(), record);
        }

        state.info.links = rebuild_link_records(&state.info, &link_identities);
        state.info.pending_relinks = classification.new_pending_relinks;

        self.finish(output_dir, state, store, &jobs, &mut summary)?;
        Ok(summary)
    }

    /// Load one source file, fold in its links and queue its documents
    fn mine_file(
        &self,
        source_dir: &Path,
        path: &str,
        info: &mut IncrementalInfo,
        store: &mut FieldStoreWriter,
        jobs: &mut Vec<MiningJob>,
        link_identities: &mut HashMap<String, FileIdentity>,
    ) -> Result<FileRecord> {
        let full = source_dir.join(path);
        let contents = std::fs::read(&full)?;
        let stat = FileStat::read(&full)?;
        let mut record = FileRecord {
            identity: Some(FileIdentity::from_contents(stat.mtime_ms, &contents)),
            ..Default::default()
        };

        let Some(loader) = self.loaders.iter().find(|l| l.handles(&full)) else {
            return Ok(record);
        };
        let docs = match loader.load(&full, &contents) {
            Ok(docs) => docs,
            Err(e) => {
                warn!(path, loader = loader.name(), error = %e, "failed to load source file");
                return Ok(record);
            }
        };

        for mut doc in docs {
            for link in &doc.links {
                let target = source_dir.join(link);
                if !target.is_file() {
                    record.unresolved_links.push(link.clone());
                    continue;
                }
                let linked = std::fs::read(&target)?;
                let linked_stat = FileStat::read(&target)?;
                link_identities.insert(
                    link.clone(),
                    FileIdentity::from_contents(linked_stat.mtime_ms, &linked),
                );
                doc.fields.push((
                    self.config.plain_text_field.clone(),
                    String::from_utf8_lossy(&linked).into_owned(),
                ));
            }
            record.links.extend(doc.links.iter().cloned());

            let job = self.assign(info, store, doc.fields);
            record.doc_ids.push(job.doc_id);
            jobs.push(job);
        }

        record.links.sort();
        record.links.dedup();
        record.unresolved_links.sort();
        record.unresolved_links.dedup();
        debug!(path, docs = record.doc_ids.len(), "queued source file");
        Ok(record)
    }

    /// Allocate the next doc id and stage the stored fields
    fn assign(
        &self,
        info: &mut IncrementalInfo,
        store: &mut FieldStoreWriter,
        fields: Vec<(String, String)>,
    ) -> MiningJob {
        let doc_id = info.next_doc_id;
        info.next_doc_id += 1;
        store.add(doc_id, self.field_infos.stored_fields(&fields));
        MiningJob { doc_id, fields }
    }

    fn load_previous(&self, output_dir: &Path) -> Result<RunState> {
        let manifest = IndexManifest::load(output_dir)?;
        if manifest.field_infos != self.field_infos {
            return Err(MorselError::Internal(
                "field configuration differs from the existing index; run a full build"
                    .to_string(),
            ));
        }

        let info = match std::fs::read(output_dir.join(INCREMENTAL_INFO_FILE)) {
            Ok(data) => IncrementalInfo::from_json(&data)?,
            Err(_) => IncrementalInfo {
                next_doc_id: manifest.num_docs,
                ..Default::default()
            },
        };
        let deleted = match std::fs::read(output_dir.join(DELETED_DOCS_FILE)) {
            Ok(data) => decode_deleted_docs(&data)?,
            Err(_) => RoaringBitmap::new(),
        };

        let strings = std::fs::read(output_dir.join(DICTIONARY_STRING_FILE))?;
        let table = std::fs::read(output_dir.join(DICTIONARY_TABLE_FILE))?;
        let mut blocks: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        let mut acc = PostingsAccumulator::new();

        for (term, term_info) in decode_dictionary(&strings, &table)? {
            let block_id = term_info.postings_block_id;
            if !blocks.contains_key(&block_id) {
                let data = std::fs::read(output_dir.join(pl_file_name(block_id)))?;
                blocks.insert(block_id, data);
            }
            let block = &blocks[&block_id];
            let start = term_info.postings_offset as usize;
            let end = start + term_info.postings_length as usize;
            let slice = block.get(start..end).ok_or_else(|| {
                MorselError::format(format!("postings of '{}' exceed block {}", term, block_id))
            })?;
            for doc in decode_term_postings(slice)? {
                acc.add_term_doc(&term, doc);
            }
        }

        info!(
            terms = acc.num_terms(),
            docs = info.next_doc_id,
            deleted = info.num_deleted_docs,
            "reloaded previous index"
        );
        Ok(RunState {
            info,
            deleted,
            acc,
        })
    }

    /// Mine queued documents, dump and write every index file
    fn finish(
        &self,
        output_dir: &Path,
        mut state: RunState,
        mut store: FieldStoreWriter,
        jobs: &[MiningJob],
        summary: &mut IndexSummary,
    ) -> Result<()> {
        let mined = mine_parallel(
            jobs,
            &self.field_infos,
            &self.config.tokenizer,
            self.config.num_threads,
        )?;
        state.acc.merge(mined);

        let num_docs = state.info.next_doc_id;
        let output = state.acc.dump(&DumpParams {
            num_docs,
            field_weights: self.field_infos.weights(),
            pl_limit: self.config.pl_limit,
            front_coding_min_prefix: self.config.front_coding_min_prefix,
            pl_cache_doc_freq_ratio: self.config.pl_cache_doc_freq_ratio,
        })?;

        std::fs::write(output_dir.join(DICTIONARY_STRING_FILE), &output.dictionary_string)?;
        std::fs::write(output_dir.join(DICTIONARY_TABLE_FILE), &output.dictionary_table)?;

        for (block_id, block) in output.blocks.iter().enumerate() {
            std::fs::write(output_dir.join(pl_file_name(block_id as u32)), block)?;
        }
        let num_pls = output.blocks.len() as u32;
        let stale = remove_stale_blocks(output_dir, num_pls)?;

        let format = self.config.doc_info_format;
        std::fs::write(output_dir.join(format.file_name()), output.doc_info.encode(format))?;
        let other = match format {
            DocInfoFormat::Binary => DocInfoFormat::Text,
            DocInfoFormat::Text => DocInfoFormat::Binary,
        };
        remove_if_exists(&output_dir.join(other.file_name()))?;

        std::fs::write(
            output_dir.join(FIELD_INFO_FILE),
            serde_json::to_vec_pretty(&self.field_infos)?,
        )?;

        let deleted_bytes = encode_deleted_docs(&state.deleted)?;
        std::fs::write(output_dir.join(DELETED_DOCS_FILE), &deleted_bytes)?;

        let shards = store.flush()?;
        write_atomic(output_dir, INCREMENTAL_INFO_FILE, &state.info.to_json()?)?;

        let index_ver = IndexManifest::compute_index_ver(
            &output.dictionary_string,
            &output.dictionary_table,
            &deleted_bytes,
            num_docs,
        );
        let manifest = IndexManifest {
            ver: INDEX_FORMAT_VERSION.to_string(),
            index_ver: index_ver.clone(),
            lang: self.config.tokenizer.clone(),
            field_infos: self.field_infos.clone(),
            num_docs,
            num_docs_per_store: self.config.num_docs_per_store,
            num_pls,
            pl_limit: self.config.pl_limit,
            pl_names_to_cache: output.pl_names_to_cache.clone(),
            doc_info_format: format,
        };
        manifest.save(output_dir)?;

        summary.num_docs = num_docs;
        summary.num_new_docs = jobs.len();
        summary.num_deleted_docs = state.info.num_deleted_docs;
        summary.num_terms = output.num_terms;
        summary.num_pls = num_pls;
        summary.index_ver = index_ver;

        info!(
            docs = num_docs,
            new_docs = jobs.len(),
            deleted_docs = state.info.num_deleted_docs,
            terms = output.num_terms,
            blocks = num_pls,
            stale_blocks = stale,
            shards,
            "index written"
        );
        Ok(())
    }

    /// Relative paths (with `/` separators) of every loadable source file
    fn collect_sources(&self, source_dir: &Path, output_dir: &Path) -> Result<BTreeSet<String>> {
        let skip = output_dir.canonicalize().ok();
        let mut found = BTreeSet::new();
        let mut stack: Vec<PathBuf> = vec![source_dir.to_path_buf()];

        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    if skip.is_some() && path.canonicalize().ok() == skip {
                        continue;
                    }
                    stack.push(path);
                } else if self.loaders.iter().any(|l| l.handles(&path)) {
                    if let Ok(relative) = path.strip_prefix(source_dir) {
                        let parts: Vec<String> = relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect();
                        found.insert(parts.join("/"));
                    }
                }
            }
        }
        Ok(found)
    }
}

/// Link records of every resolved link, owners taken from file records
fn rebuild_link_records(
    info: &IncrementalInfo,
    fresh: &HashMap<String, FileIdentity>,
) -> BTreeMap<String, LinkRecord> {
    let mut links: BTreeMap<String, LinkRecord> = BTreeMap::new();
    for (owner, record) in &info.files {
        for target in &record.links {
            if record.unresolved_links.contains(target) {
                continue;
            }
            let entry = links.entry(target.clone()).or_insert_with(|| LinkRecord {
                identity: fresh
                    .get(target)
                    .copied()
                    .or_else(|| info.links.get(target).and_then(|l| l.identity)),
                owners: Vec::new(),
            });
            entry.owners.push(owner.clone());
        }
    }
    links
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Delete `pl_<N>` files with `N >= num_pls`
fn remove_stale_blocks(output_dir: &Path, num_pls: u32) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(id) = name
            .to_str()
            .and_then(|n| n.strip_prefix("pl_"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        if id >= num_pls {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove everything a previous build left that a fresh build rewrites
fn clear_index_files(output_dir: &Path) -> Result<()> {
    remove_stale_blocks(output_dir, 0)?;
    for name in [
        CONFIG_FILE,
        INCREMENTAL_INFO_FILE,
        DELETED_DOCS_FILE,
        DocInfoFormat::Binary.file_name(),
        DocInfoFormat::Text.file_name(),
    ] {
        remove_if_exists(&output_dir.join(name))?;
    }
    let store = output_dir.join(FIELD_STORE_DIR);
    if store.is_dir() {
        std::fs::remove_dir_all(store)?;
    }
    Ok(())
}
