//! A running query: ranked matches retrieved in pages, with stored fields
//! fetched lazily and highlighted

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use ordered_float::OrderedFloat;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::evaluate::DocScores;
use super::highlight::{highlight_document, HighlightedExcerpt, TermMatcher};
use super::query_part::QueryPart;
use super::searcher::LoadedIndex;
use super::storage::BoundedFetcher;
use crate::codec::{decode_term_postings, pl_file_name, TermDoc, TermInfo};
use crate::config::SearcherConfig;
use crate::error::{MorselError, Result};
use crate::fields::{document_from_shard, shard_name};

/// Heap entry; equal scores pop in ascending doc id order
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ScoredDoc {
    score: OrderedFloat<f64>,
    doc_id: Reverse<u32>,
}

/// One retrieved result
#[derive(Clone, Debug, Serialize)]
pub struct SearchResult {
    pub doc_id: u32,
    pub score: f64,
    /// Stored `(field name, text)` values in source order; empty when the
    /// field store could not be fetched
    pub fields: Vec<(String, String)>,
    pub excerpts: Vec<HighlightedExcerpt>,
}

impl SearchResult {
    /// First stored value of `name`
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.as_str())
    }
}

/// Result handle of one search
pub struct Query {
    query_text: String,
    parts: Vec<QueryPart>,
    index: Arc<LoadedIndex>,
    fetcher: Arc<BoundedFetcher>,
    config: SearcherConfig,
    heap: BinaryHeap<ScoredDoc>,
    num_matches: usize,
    matcher: TermMatcher,
    /// Field store shards fetched so far
    shards: HashMap<String, Arc<Vec<u8>>>,
}

impl Query {
    pub(crate) fn new(
        query_text: String,
        parts: Vec<QueryPart>,
        index: Arc<LoadedIndex>,
        fetcher: Arc<BoundedFetcher>,
        config: SearcherConfig,
        scores: DocScores,
    ) -> Result<Self> {
        let mut groups = Vec::new();
        for part in &parts {
            part.collect_highlight_groups(&mut groups);
        }
        let matcher = TermMatcher::new(&groups)?;

        let num_matches = scores.len();
        let heap = scores
            .into_iter()
            .map(|(doc_id, score)| ScoredDoc {
                score: OrderedFloat(score),
                doc_id: Reverse(doc_id),
            })
            .collect();

        Ok(Self {
            query_text,
            parts,
            index,
            fetcher,
            config,
            heap,
            num_matches,
            matcher,
            shards: HashMap::new(),
        })
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    /// The query tree after correction and expansion
    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }

    /// Total number of matching documents
    pub fn num_matches(&self) -> usize {
        self.num_matches
    }

    /// Matches not yet retrieved
    pub fn remaining(&self) -> usize {
        self.heap.len()
    }

    pub fn index_ver(&self) -> &str {
        &self.index.manifest.index_ver
    }

    /// Searched terms as `(original, corrected)` pairs, for "did you mean"
    pub fn corrections(&self) -> Vec<(String, String)> {
        fn walk(part: &QueryPart, out: &mut Vec<(String, String)>) {
            if part.is_corrected {
                if let (Some(original), Some(corrected)) = (&part.original_term, part.terms.first()) {
                    out.push((original.clone(), corrected.clone()));
                }
            }
            for child in &part.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for part in &self.parts {
            walk(part, &mut out);
        }
        out
    }

    /// Pop the next `n` best results, loading and highlighting their fields
    pub async fn retrieve(&mut self, n: usize) -> Vec<SearchResult> {
        let mut results = Vec::with_capacity(n.min(self.heap.len()));

        while results.len() < n {
            let Some(ScoredDoc { score, doc_id: Reverse(doc_id) }) = self.heap.pop() else {
                break;
            };
            let fields = self.load_fields(doc_id).await;
            let excerpts = highlight_document(&fields, &self.matcher, &self.config);
            results.push(SearchResult {
                doc_id,
                score: score.into_inner(),
                fields,
                excerpts,
            });
        }

        results
    }

    async fn load_fields(&mut self, doc_id: u32) -> Vec<(String, String)> {
        let manifest = &self.index.manifest;
        let name = shard_name(doc_id, manifest.num_docs_per_store);

        let shard = match self.shards.get(&name) {
            Some(shard) => shard.clone(),
            None => match self.fetcher.fetch_cached(&name, &manifest.index_ver).await {
                Ok(shard) => {
                    self.shards.insert(name.clone(), shard.clone());
                    shard
                }
                Err(e) => {
                    warn!(doc_id, shard = %name, error = %e, "field store fetch failed");
                    return Vec::new();
                }
            },
        };

        match document_from_shard(&shard, doc_id, manifest.num_docs_per_store) {
            Ok(stored) => stored
                .into_iter()
                .filter_map(|f| {
                    manifest
                        .field_infos
                        .by_id(f.0)
                        .map(|info| (info.name.clone(), f.1))
                })
                .collect(),
            Err(e) => {
                warn!(doc_id, shard = %name, error = %e, "unreadable field store shard");
                Vec::new()
            }
        }
    }
}

/// Fetch and decode the postings of every searched term.
///
/// Terms are requested in descending `max_term_score * weight` order, so
/// the most valuable postings are first in line for the bounded fetcher.
pub(crate) async fn fetch_postings(
    index: &LoadedIndex,
    fetcher: &Arc<BoundedFetcher>,
    parts: &[QueryPart],
) -> Result<HashMap<String, Vec<TermDoc>>> {
    let mut weighted: Vec<(&str, f32)> = Vec::new();
    for part in parts {
        part.collect_terms(&mut weighted);
    }

    let mut best: HashMap<&str, (f32, TermInfo)> = HashMap::new();
    for (term, weight) in weighted {
        let Some(info) = index.dictionary.get(term) else {
            continue;
        };
        let entry = best.entry(term).or_insert((weight, *info));
        entry.0 = entry.0.max(weight);
    }

    let mut ordered: Vec<(&str, f32, TermInfo)> =
        best.into_iter().map(|(t, (w, i))| (t, w, i)).collect();
    ordered.sort_by(|a, b| {
        let key_a = a.2.max_term_score * a.1;
        let key_b = b.2.max_term_score * b.1;
        key_b.total_cmp(&key_a).then_with(|| a.0.cmp(b.0))
    });

    let mut tasks = JoinSet::new();
    for (term, _, info) in ordered {
        let fetcher = fetcher.clone();
        let term = term.to_string();
        let version = index.manifest.index_ver.clone();
        let cache_block = index
            .manifest
            .pl_names_to_cache
            .contains(&info.postings_block_id);
        tasks.spawn(async move {
            let docs = match fetch_postings_bytes(&fetcher, &version, &info, cache_block).await {
                Ok(bytes) => decode_term_postings(&bytes),
                Err(e) => Err(e),
            };
            (term, docs)
        });
    }

    // A term whose postings cannot be read matches nothing
    let mut postings = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (term, docs) = joined
            .map_err(|e| MorselError::Internal(format!("postings fetch task failed: {}", e)))?;
        match docs {
            Ok(docs) => {
                debug!(term = %term, docs = docs.len(), "fetched postings");
                postings.insert(term, docs);
            }
            Err(e) => warn!(term = %term, error = %e, "dropping term with unreadable postings"),
        }
    }
    Ok(postings)
}

/// Bytes of one term's postings: sliced from a cached block when there is
/// one, else a ranged read
async fn fetch_postings_bytes(
    fetcher: &BoundedFetcher,
    version: &str,
    info: &TermInfo,
    cache_block: bool,
) -> Result<Vec<u8>> {
    let name = pl_file_name(info.postings_block_id);
    let start = info.postings_offset as usize;
    let end = start + info.postings_length as usize;

    let block = match fetcher.cached(&name, version).await {
        Some(block) => Some(block),
        None if cache_block => Some(fetcher.fetch_cached(&name, version).await?),
        None => None,
    };

    match block {
        Some(block) => block.get(start..end).map(|s| s.to_vec()).ok_or_else(|| {
            MorselError::format(format!(
                "postings range {}..{} outside {} ({} bytes)",
                start,
                end,
                name,
                block.len()
            ))
        }),
        None => fetcher.fetch_range(&name, start as u64..end as u64).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_order() {
        let mut heap: BinaryHeap<ScoredDoc> = [(1.0, 3), (2.0, 5), (1.0, 1)]
            .into_iter()
            .map(|(s, d)| ScoredDoc {
                score: OrderedFloat(s),
                doc_id: Reverse(d),
            })
            .collect();
        let order: Vec<u32> = std::iter::from_fn(|| heap.pop().map(|d| d.doc_id.0)).collect();
        assert_eq!(order, vec![5, 1, 3]);
    }
}
