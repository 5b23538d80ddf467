//! Query engine entry point: loads an index from an [`IndexStore`] and runs
//! searches against it

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use roaring::RoaringBitmap;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::dictionary::Dictionary;
use super::evaluate::{evaluate_clauses, MatchContext};
use super::preprocess::preprocess;
use super::query::{fetch_postings, Query};
use super::query_string::{parse_free_text, QueryStringParser};
use super::storage::{is_not_found, BlockCache, BoundedFetcher, IndexStore};
use crate::codec::{decode_deleted_docs, pl_file_name, DocInfo, TermDoc};
use crate::config::SearcherConfig;
use crate::error::Result;
use crate::manifest::{
    IndexManifest, CONFIG_FILE, DELETED_DOCS_FILE, DICTIONARY_STRING_FILE, DICTIONARY_TABLE_FILE,
};
use crate::tokenizer::Tokenizer;

/// Everything a search needs in memory, for one index version
pub struct LoadedIndex {
    pub manifest: IndexManifest,
    pub dictionary: Dictionary,
    pub doc_info: DocInfo,
    pub deleted: RoaringBitmap,
    pub tokenizer: Tokenizer,
    weights: Vec<f32>,
}

impl LoadedIndex {
    /// Load the manifest, then the dictionary, normalization factors and
    /// tombstones it describes
    pub async fn load(fetcher: &BoundedFetcher) -> Result<Self> {
        let manifest = IndexManifest::from_json(&fetcher.fetch(CONFIG_FILE).await?)?;
        Self::load_with_manifest(fetcher, manifest).await
    }

    async fn load_with_manifest(fetcher: &BoundedFetcher, manifest: IndexManifest) -> Result<Self> {
        let version = manifest.index_ver.as_str();
        let (strings, table, doc_info, deleted) = tokio::join!(
            fetcher.fetch_cached(DICTIONARY_STRING_FILE, version),
            fetcher.fetch_cached(DICTIONARY_TABLE_FILE, version),
            fetcher.fetch_cached(manifest.doc_info_format.file_name(), version),
            fetcher.fetch_cached(DELETED_DOCS_FILE, version),
        );

        let dictionary = Dictionary::decode(&strings?, &table?)?;
        let doc_info = DocInfo::decode(
            &doc_info?,
            manifest.doc_info_format,
            manifest.field_infos.num_fields(),
        )?;
        let deleted = match deleted {
            Ok(bytes) => decode_deleted_docs(&bytes)?,
            Err(e) if is_not_found(&e) => RoaringBitmap::new(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            tokenizer: Tokenizer::new(&manifest.lang),
            weights: manifest.field_infos.weights(),
            manifest,
            dictionary,
            doc_info,
            deleted,
        })
    }

    pub fn index_ver(&self) -> &str {
        &self.manifest.index_ver
    }

    /// Documents not tombstoned
    pub fn num_live_docs(&self) -> u64 {
        (self.manifest.num_docs as u64).saturating_sub(self.deleted.len())
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn match_context<'a>(&'a self, postings: &'a HashMap<String, Vec<TermDoc>>) -> MatchContext<'a> {
        MatchContext {
            dictionary: &self.dictionary,
            doc_info: &self.doc_info,
            field_infos: &self.manifest.field_infos,
            weights: &self.weights,
            deleted: &self.deleted,
            num_docs: self.manifest.num_docs,
            postings,
        }
    }
}

/// The index version searches currently run against; swapped atomically
/// when a newer version is loaded
pub struct SharedIndex {
    inner: ArcSwap<LoadedIndex>,
}

impl SharedIndex {
    pub fn new(index: LoadedIndex) -> Self {
        Self {
            inner: ArcSwap::from_pointee(index),
        }
    }

    /// Current index; stays valid for the caller after a swap
    pub fn load(&self) -> Arc<LoadedIndex> {
        self.inner.load_full()
    }

    pub fn store(&self, index: LoadedIndex) {
        self.inner.store(Arc::new(index));
    }

    pub fn index_ver(&self) -> String {
        self.inner.load().manifest.index_ver.clone()
    }
}

/// Searches one index through a bounded, cached fetcher
pub struct Searcher {
    fetcher: Arc<BoundedFetcher>,
    index: SharedIndex,
    config: SearcherConfig,
}

impl Searcher {
    /// Load the index in `store`.
    ///
    /// Fails with `VersionMismatch` for an index of another format version
    /// and `Format` for corrupted files; no partial index is ever used.
    pub async fn open(
        store: Arc<dyn IndexStore>,
        cache: Option<Arc<dyn BlockCache>>,
        config: SearcherConfig,
    ) -> Result<Self> {
        let fetcher = Arc::new(BoundedFetcher::new(store, cache, config.max_concurrent_fetches));
        let index = LoadedIndex::load(&fetcher).await?;
        prefetch_blocks(&fetcher, &index).await;

        info!(
            index_ver = %index.index_ver(),
            terms = index.dictionary.len(),
            live_docs = index.num_live_docs(),
            "opened index"
        );

        Ok(Self {
            fetcher,
            index: SharedIndex::new(index),
            config,
        })
    }

    pub fn config(&self) -> &SearcherConfig {
        &self.config
    }

    pub fn index(&self) -> Arc<LoadedIndex> {
        self.index.load()
    }

    /// Reload when the stored index changed.
    ///
    /// Returns whether a new version was swapped in. Queries already
    /// running keep the version they started with.
    pub async fn refresh(&self) -> Result<bool> {
        let manifest = IndexManifest::from_json(&self.fetcher.fetch(CONFIG_FILE).await?)?;
        if manifest.index_ver == self.index.index_ver() {
            return Ok(false);
        }

        let index = LoadedIndex::load_with_manifest(&self.fetcher, manifest).await?;
        prefetch_blocks(&self.fetcher, &index).await;
        let version = index.index_ver().to_string();
        info!(index_ver = %version, "swapped in new index version");
        self.index.store(index);
        self.fetcher.retain_version(&version).await;
        Ok(true)
    }

    /// Parse, preprocess and evaluate `query`.
    ///
    /// A query that does not end in whitespace is still being typed, so its
    /// last term is also expanded to longer terms.
    pub async fn search(&self, query: &str) -> Result<Query> {
        let started = Instant::now();
        let index = self.index.load();

        let fields: Vec<String> = index
            .manifest
            .field_infos
            .iter()
            .map(|f| f.name.clone())
            .collect();
        let mut parts = match QueryStringParser::new(query, &index.tokenizer)
            .and_then(|parser| parser.with_fields(fields).parse())
        {
            Ok(parts) => parts,
            Err(e) => {
                debug!(query, error = %e, "falling back to free text query");
                parse_free_text(query, &index.tokenizer)
            }
        };

        let expand_last = !query.ends_with(char::is_whitespace);
        preprocess(&mut parts, &index.dictionary, &self.config, expand_last);

        let postings = fetch_postings(&index, &self.fetcher, &parts).await?;
        let scores = evaluate_clauses(&parts, &index.match_context(&postings));

        debug!(
            query,
            matches = scores.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );

        Query::new(
            query.to_string(),
            parts,
            index.clone(),
            self.fetcher.clone(),
            self.config.clone(),
            scores,
        )
    }
}

/// Pull the blocks listed for eager caching into the cache; failures only
/// cost a later fetch
async fn prefetch_blocks(fetcher: &Arc<BoundedFetcher>, index: &LoadedIndex) {
    let mut tasks = JoinSet::new();
    for &block_id in &index.manifest.pl_names_to_cache {
        let fetcher = fetcher.clone();
        let version = index.manifest.index_ver.clone();
        tasks.spawn(async move {
            let name = pl_file_name(block_id);
            fetcher.fetch_cached(&name, &version).await.map_err(|e| (name, e))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => {}
            Ok(Err((name, e))) => warn!(block = %name, error = %e, "postings prefetch failed"),
            Err(e) => warn!(error = %e, "postings prefetch task failed"),
        }
    }
}
