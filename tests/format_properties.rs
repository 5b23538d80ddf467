//! Properties of a written index, checked by decoding its files directly

use std::path::Path;

use tempfile::TempDir;

use morsel::codec::{decode_dictionary, decode_term_postings, pl_file_name, DocInfo, TermDoc, TermInfo};
use morsel::scoring::{idf, impact, term_doc_score, tf_weight};
use morsel::{IndexManifest, IndexWriter, IndexingConfig, LoadedDocument};

fn corpus() -> Vec<LoadedDocument> {
    let bodies = [
        "the quick brown fox jumps over the lazy dog",
        "a lazy afternoon with a lazy dog and a lazier cat",
        "foxes are quick and foxes are clever",
        "dogs and cats and foxes",
        "nothing in common here",
        "quick quick quick",
    ];
    bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            LoadedDocument::new()
                .with_field("title", format!("Animal story {}", i))
                .with_field("heading", if i % 2 == 0 { "Foxes" } else { "Dogs" })
                .with_field("body", *body)
        })
        .collect()
}

struct DecodedIndex {
    manifest: IndexManifest,
    terms: Vec<(String, TermInfo)>,
    doc_info: DocInfo,
    out: TempDir,
}

impl DecodedIndex {
    fn build() -> Self {
        let out = TempDir::new().unwrap();
        // Small blocks so the corpus spans several postings files
        let config = IndexingConfig::default()
            .with_num_threads(2)
            .with_pl_limit(64);
        IndexWriter::new(config)
            .unwrap()
            .build_from_documents(corpus(), out.path())
            .unwrap();

        let manifest = IndexManifest::load(out.path()).unwrap();
        let terms = decode_dictionary(
            &read(out.path(), "dictionaryString"),
            &read(out.path(), "dictionaryTable"),
        )
        .unwrap();
        let doc_info = DocInfo::decode(
            &read(out.path(), manifest.doc_info_format.file_name()),
            manifest.doc_info_format,
            manifest.field_infos.num_fields(),
        )
        .unwrap();

        Self {
            manifest,
            terms,
            doc_info,
            out,
        }
    }

    fn postings(&self, info: &TermInfo) -> Vec<TermDoc> {
        let block = read(self.out.path(), &pl_file_name(info.postings_block_id));
        let start = info.postings_offset as usize;
        let end = start + info.postings_length as usize;
        decode_term_postings(&block[start..end]).unwrap()
    }
}

fn read(dir: &Path, name: &str) -> Vec<u8> {
    std::fs::read(dir.join(name)).unwrap()
}

#[test]
fn postings_blocks_are_split() {
    let index = DecodedIndex::build();
    assert!(index.manifest.num_pls > 1);
    for block_id in 0..index.manifest.num_pls {
        assert!(index.out.path().join(pl_file_name(block_id)).exists());
    }
}

#[test]
fn dictionary_is_strictly_sorted_with_matching_doc_freqs() {
    let index = DecodedIndex::build();
    assert!(!index.terms.is_empty());
    for pair in index.terms.windows(2) {
        assert!(pair[0].0 < pair[1].0, "{} !< {}", pair[0].0, pair[1].0);
    }
    for (term, info) in &index.terms {
        assert_eq!(index.postings(info).len() as u32, info.doc_freq, "{}", term);
    }
}

#[test]
fn postings_are_impact_ordered() {
    let index = DecodedIndex::build();
    let weights = index.manifest.field_infos.weights();

    for (term, info) in &index.terms {
        let docs = index.postings(info);
        for pair in docs.windows(2) {
            let first = impact(&pair[0], &index.doc_info, &weights);
            let second = impact(&pair[1], &index.doc_info, &weights);
            assert!(first >= second, "{}: {} before {}", term, first, second);
            if first == second {
                assert!(pair[0].doc_id < pair[1].doc_id, "{}", term);
            }
        }
    }
}

#[test]
fn max_term_score_is_best_document_score() {
    let index = DecodedIndex::build();
    let weights = index.manifest.field_infos.weights();

    for (term, info) in &index.terms {
        let term_idf = idf(index.manifest.num_docs, info.doc_freq);
        let best = index
            .postings(info)
            .iter()
            .map(|doc| term_doc_score(doc, term_idf, &index.doc_info, &weights))
            .fold(0f64, f64::max);
        assert!(
            (best as f32 - info.max_term_score).abs() < 1e-6,
            "{}: {} vs {}",
            term,
            best,
            info.max_term_score
        );
    }
}

#[test]
fn normalization_factors_match_postings() {
    let index = DecodedIndex::build();
    let num_docs = index.manifest.num_docs;
    let num_fields = index.manifest.field_infos.num_fields();
    let mut sums = vec![vec![0f64; num_fields]; num_docs as usize];

    for (_, info) in &index.terms {
        let term_idf = idf(num_docs, info.doc_freq);
        for doc in index.postings(info) {
            for field in &doc.fields {
                let w = tf_weight(field.term_freq()) * term_idf;
                sums[doc.doc_id as usize][field.field_id as usize] += w * w;
            }
        }
    }

    for (doc_id, fields) in sums.iter().enumerate() {
        for (field_id, sum) in fields.iter().enumerate() {
            let stored = index.doc_info.factor(doc_id as u32, field_id as u8);
            assert!(
                (stored - sum.sqrt()).abs() < 1e-9,
                "doc {} field {}: {} vs {}",
                doc_id,
                field_id,
                stored,
                sum.sqrt()
            );
        }
    }
}

#[test]
fn cached_blocks_hold_frequent_terms() {
    let index = DecodedIndex::build();
    let threshold = 0.5 * index.manifest.num_docs as f64;

    for &block_id in &index.manifest.pl_names_to_cache {
        assert!(index.terms.iter().any(|(_, info)| {
            info.postings_block_id == block_id && info.doc_freq as f64 >= threshold
        }));
    }
    for (term, info) in &index.terms {
        if info.doc_freq as f64 >= threshold {
            assert!(
                index.manifest.pl_names_to_cache.contains(&info.postings_block_id),
                "{}",
                term
            );
        }
    }
}
