//! In-memory postings accumulator and the dump into on-disk blocks
//!
//! Terms live in an arena addressed by term id. The accumulator owns every
//! posting until [`PostingsAccumulator::dump`] consumes it and hands back
//! immutable bytes.

use std::collections::HashMap;

use crate::codec::{
    encode_term_postings, encode_term_strings, encode_term_table, DocInfo, FieldPostings,
    PostingsBlockWriter, TermDoc, TermInfo,
};
use crate::error::Result;
use crate::scoring::{idf, impact, term_doc_score, tf_weight};

struct TermEntry {
    term: String,
    docs: Vec<TermDoc>,
}

/// Term → per-document per-field positions
#[derive(Default)]
pub struct PostingsAccumulator {
    term_ids: HashMap<String, u32>,
    terms: Vec<TermEntry>,
}

/// Parameters of one dump
#[derive(Clone, Debug)]
pub struct DumpParams {
    /// Total documents, tombstoned ones included; doc ids are `0..num_docs`
    pub num_docs: u32,
    /// Field weights indexed by field id
    pub field_weights: Vec<f32>,
    pub pl_limit: usize,
    pub front_coding_min_prefix: usize,
    pub pl_cache_doc_freq_ratio: f64,
}

/// Serialized index content produced by a dump
#[derive(Debug)]
pub struct DumpOutput {
    pub dictionary_string: Vec<u8>,
    pub dictionary_table: Vec<u8>,
    /// Postings blocks in id order
    pub blocks: Vec<Vec<u8>>,
    pub doc_info: DocInfo,
    pub pl_names_to_cache: Vec<u32>,
    pub num_terms: usize,
}

impl PostingsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn term_id(&mut self, term: &str) -> u32 {
        if let Some(&id) = self.term_ids.get(term) {
            return id;
        }
        let id = self.terms.len() as u32;
        self.term_ids.insert(term.to_string(), id);
        self.terms.push(TermEntry {
            term: term.to_string(),
            docs: Vec::new(),
        });
        id
    }

    /// Record one occurrence of `term`
    pub fn add(&mut self, term: &str, field_id: u8, doc_id: u32, position: u32) {
        let id = self.term_id(term) as usize;
        let docs = &mut self.terms[id].docs;

        if docs.last().map(|d| d.doc_id) != Some(doc_id) {
            docs.push(TermDoc {
                doc_id,
                fields: Vec::new(),
            });
        }
        if let Some(doc) = docs.last_mut() {
            match doc.fields.iter_mut().find(|f| f.field_id == field_id) {
                Some(field) => field.positions.push(position),
                None => doc.fields.push(FieldPostings::new(field_id, vec![position])),
            }
        }
    }

    /// Record a whole decoded posting, used when reloading a previous index
    pub fn add_term_doc(&mut self, term: &str, doc: TermDoc) {
        let id = self.term_id(term) as usize;
        self.terms[id].docs.push(doc);
    }

    /// Move every posting of `other` into this accumulator
    pub fn merge(&mut self, other: PostingsAccumulator) {
        for entry in other.terms {
            let id = self.term_id(&entry.term) as usize;
            self.terms[id].docs.extend(entry.docs);
        }
    }

    /// Serialize everything: normalization factors, impact-ordered postings
    /// blocks and the two dictionary streams
    pub fn dump(self, params: &DumpParams) -> Result<DumpOutput> {
        let mut entries: Vec<TermEntry> = self
            .terms
            .into_iter()
            .map(|mut entry| {
                entry.docs = coalesce_docs(entry.docs);
                entry
            })
            .filter(|entry| !entry.docs.is_empty())
            .collect();
        entries.sort_by(|a, b| a.term.cmp(&b.term));

        let num_fields = params.field_weights.len();
        let doc_info = calc_normalization_factors(
            entries.iter().map(|e| e.docs.as_slice()),
            params.num_docs,
            num_fields,
        );

        let cache_threshold = params.pl_cache_doc_freq_ratio * params.num_docs as f64;
        let mut blocks = PostingsBlockWriter::new(params.pl_limit);
        let mut infos: Vec<TermInfo> = Vec::with_capacity(entries.len());
        let mut pl_names_to_cache: Vec<u32> = Vec::new();
        let mut buffer = Vec::new();

        for entry in &mut entries {
            let doc_freq = entry.docs.len() as u32;
            let term_idf = idf(params.num_docs, doc_freq);

            let mut max_term_score = 0f64;
            let mut scored: Vec<(f64, TermDoc)> = std::mem::take(&mut entry.docs)
                .into_iter()
                .map(|doc| {
                    let score = term_doc_score(&doc, term_idf, &doc_info, &params.field_weights);
                    max_term_score = max_term_score.max(score);
                    (impact(&doc, &doc_info, &params.field_weights), doc)
                })
                .collect();
            // Stable: equal impacts keep ascending doc id order
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));
            let docs: Vec<TermDoc> = scored.into_iter().map(|(_, doc)| doc).collect();

            buffer.clear();
            encode_term_postings(&docs, &mut buffer)?;
            let location = blocks.add_term(&buffer);

            if doc_freq as f64 >= cache_threshold
                && pl_names_to_cache.last() != Some(&location.block_id)
            {
                pl_names_to_cache.push(location.block_id);
            }

            infos.push(TermInfo {
                doc_freq,
                postings_block_id: location.block_id,
                postings_offset: location.offset,
                postings_length: location.length,
                max_term_score: max_term_score as f32,
            });
        }

        let terms: Vec<&str> = entries.iter().map(|e| e.term.as_str()).collect();
        let dictionary_string = encode_term_strings(&terms, params.front_coding_min_prefix)?;
        let dictionary_table = encode_term_table(&infos)?;

        Ok(DumpOutput {
            dictionary_string,
            dictionary_table,
            blocks: blocks.finish(),
            doc_info,
            pl_names_to_cache,
            num_terms: terms.len(),
        })
    }
}

/// Sort by doc id and fold duplicate documents and fields together
fn coalesce_docs(mut docs: Vec<TermDoc>) -> Vec<TermDoc> {
    docs.sort_by_key(|d| d.doc_id);
    let mut out: Vec<TermDoc> = Vec::with_capacity(docs.len());

    for doc in docs {
        match out.last_mut() {
            Some(last) if last.doc_id == doc.doc_id => {
                for field in doc.fields {
                    match last.fields.iter_mut().find(|f| f.field_id == field.field_id) {
                        Some(existing) => existing.positions.extend(field.positions),
                        None => last.fields.push(field),
                    }
                }
            }
            _ => out.push(doc),
        }
    }

    for doc in &mut out {
        doc.fields.sort_by_key(|f| f.field_id);
        for field in &mut doc.fields {
            field.positions.sort_unstable();
            field.positions.dedup();
        }
    }
    out
}

/// Per document and field: `sqrt(Σ_terms (tf_weight * idf)^2)`
pub fn calc_normalization_factors<'a>(
    postings: impl Iterator<Item = &'a [TermDoc]>,
    num_docs: u32,
    num_fields: usize,
) -> DocInfo {
    let mut sums = vec![0f64; num_docs as usize * num_fields];

    for docs in postings {
        let term_idf = idf(num_docs, docs.len() as u32);
        for doc in docs {
            for field in &doc.fields {
                let field_id = field.field_id as usize;
                if field_id >= num_fields || doc.doc_id >= num_docs {
                    continue;
                }
                let w = tf_weight(field.term_freq()) * term_idf;
                sums[doc.doc_id as usize * num_fields + field_id] += w * w;
            }
        }
    }

    let mut doc_info = DocInfo::new(num_docs as usize, num_fields);
    for (doc_id, chunk) in sums.chunks(num_fields.max(1)).enumerate() {
        let factors: Vec<f64> = chunk.iter().map(|s| s.sqrt()).collect();
        doc_info.set_factors(doc_id as u32, &factors);
    }
    doc_info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_dictionary, decode_term_postings};

    fn params(num_docs: u32) -> DumpParams {
        DumpParams {
            num_docs,
            field_weights: vec![0.4, 0.6],
            pl_limit: 65_535,
            front_coding_min_prefix: 3,
            pl_cache_doc_freq_ratio: 0.5,
        }
    }

    fn postings_of(output: &DumpOutput, term: &str) -> Vec<TermDoc> {
        let entries =
            decode_dictionary(&output.dictionary_string, &output.dictionary_table).unwrap();
        let (_, info) = entries.iter().find(|(t, _)| t == term).unwrap();
        let block = &output.blocks[info.postings_block_id as usize];
        let start = info.postings_offset as usize;
        decode_term_postings(&block[start..start + info.postings_length as usize]).unwrap()
    }

    #[test]
    fn test_add_groups_by_doc_and_field() {
        let mut acc = PostingsAccumulator::new();
        acc.add("rust", 0, 0, 1);
        acc.add("rust", 1, 0, 4);
        acc.add("rust", 1, 0, 7);
        acc.add("rust", 1, 2, 0);
        acc.add("lang", 1, 2, 1);
        assert_eq!(acc.num_terms(), 2);

        let output = acc.dump(&params(3)).unwrap();
        let docs = postings_of(&output, "rust");
        assert_eq!(docs.len(), 2);
        let doc0 = docs.iter().find(|d| d.doc_id == 0).unwrap();
        assert_eq!(doc0.field(1).unwrap().positions, vec![4, 7]);
    }

    #[test]
    fn test_out_of_order_input_is_coalesced() {
        let mut acc = PostingsAccumulator::new();
        acc.add("a", 0, 1, 5);
        acc.add("a", 0, 0, 2);
        acc.add("a", 0, 1, 3);
        acc.add("b", 0, 0, 0);
        acc.add("b", 0, 1, 0);
        acc.add("b", 0, 2, 0);

        let output = acc.dump(&params(3)).unwrap();
        let docs = postings_of(&output, "a");
        let doc1 = docs.iter().find(|d| d.doc_id == 1).unwrap();
        assert_eq!(doc1.fields.len(), 1);
        assert_eq!(doc1.fields[0].positions, vec![3, 5]);
    }

    #[test]
    fn test_merge_accumulators() {
        let mut left = PostingsAccumulator::new();
        left.add("shared", 0, 0, 0);
        let mut right = PostingsAccumulator::new();
        right.add("shared", 0, 1, 0);
        right.add("only", 1, 1, 1);
        left.merge(right);
        assert_eq!(left.num_terms(), 2);

        let output = left.dump(&params(2)).unwrap();
        assert_eq!(postings_of(&output, "shared").len(), 2);
        assert_eq!(output.num_terms, 2);
    }

    #[test]
    fn test_block_ids_follow_sorted_terms() {
        let mut acc = PostingsAccumulator::new();
        for (i, term) in ["delta", "alpha", "charlie", "bravo"].iter().enumerate() {
            for doc in 0..4u32 {
                acc.add(term, 0, doc, i as u32);
            }
        }
        let mut p = params(4);
        p.pl_limit = 10;
        let output = acc.dump(&p).unwrap();
        let entries =
            decode_dictionary(&output.dictionary_string, &output.dictionary_table).unwrap();
        let terms: Vec<&str> = entries.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["alpha", "bravo", "charlie", "delta"]);
        let blocks: Vec<u32> = entries.iter().map(|(_, i)| i.postings_block_id).collect();
        assert!(blocks.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(output.blocks.len(), *blocks.last().unwrap() as usize + 1);
        // Every term is in all docs: df/N = 1 >= 0.5
        assert_eq!(output.pl_names_to_cache.len(), output.blocks.len());
    }

    #[test]
    fn test_max_term_score_is_best_document_score() {
        let mut acc = PostingsAccumulator::new();
        acc.add("common", 0, 0, 0);
        acc.add("common", 0, 1, 0);
        acc.add("common", 0, 2, 0);
        acc.add("rare", 1, 0, 1);
        acc.add("rare", 1, 0, 2);
        let output = acc.dump(&params(3)).unwrap();
        let entries =
            decode_dictionary(&output.dictionary_string, &output.dictionary_table).unwrap();

        let common = entries.iter().find(|(t, _)| t == "common").unwrap().1;
        assert_eq!(common.doc_freq, 3);
        assert_eq!(common.max_term_score, 0.0);

        // Only term with a nonzero idf in doc 0 field 1, so the score is the
        // field weight
        let rare = entries.iter().find(|(t, _)| t == "rare").unwrap().1;
        assert!((rare.max_term_score - 0.6).abs() < 1e-6);
    }
}
