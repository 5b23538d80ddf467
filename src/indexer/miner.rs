//! Document miner: tokenizes field values into the postings accumulator,
//! fanned out over worker threads

use std::collections::HashMap;

use tracing::debug;

use super::accumulator::PostingsAccumulator;
use crate::config::TokenizerConfig;
use crate::error::{MorselError, Result};
use crate::fields::FieldInfos;
use crate::tokenizer::{Tokenizer, SENTENCE_POSITION_GAP};

/// A document with its assigned id, ready to be mined
#[derive(Clone, Debug)]
pub struct MiningJob {
    pub doc_id: u32,
    pub fields: Vec<(String, String)>,
}

/// Feed one document into `acc`.
///
/// Several values of the same field are laid out one after another, with a
/// sentence gap in between, so positions stay ascending per field.
pub fn mine_document(
    tokenizer: &Tokenizer,
    field_infos: &FieldInfos,
    job: &MiningJob,
    acc: &mut PostingsAccumulator,
) -> usize {
    let mut next_base: HashMap<u8, u32> = HashMap::new();
    let mut tokens = 0;

    for (name, text) in &job.fields {
        let Some(info) = field_infos.get(name) else {
            debug!(field = %name, doc_id = job.doc_id, "skipping unknown field");
            continue;
        };
        if !info.is_indexed() {
            continue;
        }

        let base = next_base.get(&info.id).copied().unwrap_or(0);
        let mut last = None;
        for (term, pos) in tokenizer.tokenize_with_positions_ordered(text) {
            acc.add(&term, info.id, job.doc_id, base + pos);
            last = Some(pos);
            tokens += 1;
        }
        if let Some(last) = last {
            next_base.insert(info.id, base + last + 1 + SENTENCE_POSITION_GAP);
        }
    }

    tokens
}

/// Mine `jobs` on up to `num_threads` scoped threads.
///
/// Each thread fills its own accumulator from a contiguous slice of jobs;
/// the accumulators are merged once every thread finishes.
pub fn mine_parallel(
    jobs: &[MiningJob],
    field_infos: &FieldInfos,
    tokenizer_config: &TokenizerConfig,
    num_threads: usize,
) -> Result<PostingsAccumulator> {
    if jobs.is_empty() {
        return Ok(PostingsAccumulator::new());
    }

    let num_threads = num_threads.clamp(1, jobs.len());
    let chunk_size = jobs.len().div_ceil(num_threads);

    let partials = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .chunks(chunk_size)
            .enumerate()
            .map(|(worker, chunk)| {
                scope.spawn(move |_| {
                    // Dedicated tokenizer per mining thread
                    let tokenizer = Tokenizer::new(tokenizer_config);
                    let mut acc = PostingsAccumulator::new();
                    let mut tokens = 0;
                    for job in chunk {
                        tokens += mine_document(&tokenizer, field_infos, job, &mut acc);
                    }
                    debug!(worker, docs = chunk.len(), tokens, "mining worker finished");
                    acc
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join())
            .collect::<std::result::Result<Vec<_>, _>>()
    })
    .map_err(|_| MorselError::Internal("mining thread panicked".to_string()))?
    .map_err(|_| MorselError::Internal("mining thread panicked".to_string()))?;

    let mut merged = PostingsAccumulator::new();
    for partial in partials {
        merged.merge(partial);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_dictionary, decode_term_postings};
    use crate::config::IndexingConfig;
    use crate::indexer::accumulator::DumpParams;

    fn jobs() -> Vec<MiningJob> {
        (0..10u32)
            .map(|doc_id| MiningJob {
                doc_id,
                fields: vec![
                    ("title".to_string(), format!("Doc {}", doc_id)),
                    ("body".to_string(), "shared words here".to_string()),
                    ("body".to_string(), format!("unique{} words", doc_id)),
                    ("link".to_string(), "https://example.com".to_string()),
                ],
            })
            .collect()
    }

    fn dump_terms(acc: PostingsAccumulator, infos: &FieldInfos) -> Vec<(String, u32)> {
        let output = acc
            .dump(&DumpParams {
                num_docs: 10,
                field_weights: infos.weights(),
                pl_limit: 65_535,
                front_coding_min_prefix: 3,
                pl_cache_doc_freq_ratio: 0.5,
            })
            .unwrap();
        decode_dictionary(&output.dictionary_string, &output.dictionary_table)
            .unwrap()
            .into_iter()
            .map(|(t, i)| (t, i.doc_freq))
            .collect()
    }

    #[test]
    fn test_parallel_matches_single_thread() {
        let config = IndexingConfig::default();
        let infos = FieldInfos::new(&config.fields).unwrap();

        let single = mine_parallel(&jobs(), &infos, &config.tokenizer, 1).unwrap();
        let parallel = mine_parallel(&jobs(), &infos, &config.tokenizer, 4).unwrap();
        assert_eq!(dump_terms(single, &infos), dump_terms(parallel, &infos));
    }

    #[test]
    fn test_unweighted_fields_are_not_indexed() {
        let config = IndexingConfig::default();
        let infos = FieldInfos::new(&config.fields).unwrap();
        let acc = mine_parallel(&jobs(), &infos, &config.tokenizer, 2).unwrap();
        let terms = dump_terms(acc, &infos);
        assert!(terms.iter().all(|(t, _)| t != "https" && t != "example"));
        assert!(terms.contains(&("shared".to_string(), 10)));
        assert!(terms.contains(&("unique3".to_string(), 1)));
    }

    #[test]
    fn test_repeated_field_positions_ascend() {
        let config = IndexingConfig::default();
        let infos = FieldInfos::new(&config.fields).unwrap();
        let tokenizer = Tokenizer::new(&config.tokenizer);
        let mut acc = PostingsAccumulator::new();
        mine_document(&tokenizer, &infos, &jobs()[0], &mut acc);

        let output = acc
            .dump(&DumpParams {
                num_docs: 1,
                field_weights: infos.weights(),
                pl_limit: 65_535,
                front_coding_min_prefix: 3,
                pl_cache_doc_freq_ratio: 0.5,
            })
            .unwrap();
        let entries =
            decode_dictionary(&output.dictionary_string, &output.dictionary_table).unwrap();
        let (_, words) = entries.iter().find(|(t, _)| t == "words").unwrap();
        let block = &output.blocks[words.postings_block_id as usize];
        let start = words.postings_offset as usize;
        let docs =
            decode_term_postings(&block[start..start + words.postings_length as usize]).unwrap();
        let body = infos.get("body").unwrap().id;
        // "shared words here" then "unique0 words": 1, then 3 + 1 + gap
        assert_eq!(
            docs[0].field(body).unwrap().positions,
            vec![1, 3 + 1 + SENTENCE_POSITION_GAP]
        );
    }
}
