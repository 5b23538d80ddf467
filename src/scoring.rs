/// Scoring functions shared by the indexer (impact order, max term score)
/// and the query engine
use crate::codec::{DocInfo, TermDoc};

/// Inverse document frequency: `log10(N / df)`
///
/// # Arguments
/// * `num_docs` - Number of documents in the index, tombstoned ones included
/// * `doc_freq` - Number of documents containing the term
pub fn idf(num_docs: u32, doc_freq: u32) -> f64 {
    if doc_freq == 0 || num_docs == 0 {
        return 0.0;
    }
    (num_docs as f64 / doc_freq as f64).log10()
}

/// Dampened term frequency: `1 + log10(tf)`
pub fn tf_weight(term_freq: u32) -> f64 {
    if term_freq == 0 {
        0.0
    } else {
        1.0 + (term_freq as f64).log10()
    }
}

fn normalized(value: f64, norm: f64) -> f64 {
    if norm > 0.0 {
        value / norm
    } else {
        0.0
    }
}

/// Score of one term in one document
///
/// Sums `(tf_weight * idf / norm[field]) * weight[field]` over the fields
/// the term occurs in. Fields with a zero normalization factor contribute 0.
///
/// # Arguments
/// * `doc` - The term's postings for this document
/// * `idf` - Inverse document frequency of the term
/// * `doc_info` - Normalization factors
/// * `weights` - Field weights, indexed by field id
pub fn term_doc_score(doc: &TermDoc, idf: f64, doc_info: &DocInfo, weights: &[f32]) -> f64 {
    doc.fields
        .iter()
        .map(|field| {
            let weight = weights.get(field.field_id as usize).copied().unwrap_or(0.0) as f64;
            let norm = doc_info.factor(doc.doc_id, field.field_id);
            normalized(tf_weight(field.term_freq()) * idf, norm) * weight
        })
        .sum()
}

/// Impact of one document on a term's postings order:
/// `Σ (field_tf / norm[field]) * weight[field]`
pub fn impact(doc: &TermDoc, doc_info: &DocInfo, weights: &[f32]) -> f64 {
    doc.fields
        .iter()
        .map(|field| {
            let weight = weights.get(field.field_id as usize).copied().unwrap_or(0.0) as f64;
            let norm = doc_info.factor(doc.doc_id, field.field_id);
            normalized(field.term_freq() as f64, norm) * weight
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldPostings;

    #[test]
    fn test_idf_and_tf_weight() {
        assert_eq!(idf(10, 10), 0.0);
        assert!((idf(100, 1) - 2.0).abs() < 1e-12);
        assert_eq!(idf(10, 0), 0.0);
        assert_eq!(tf_weight(1), 1.0);
        assert!((tf_weight(10) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_norm_contributes_nothing() {
        let doc = TermDoc {
            doc_id: 0,
            fields: vec![FieldPostings::new(0, vec![1, 2]), FieldPostings::new(1, vec![4])],
        };
        let mut doc_info = DocInfo::new(1, 2);
        doc_info.set_factors(0, &[0.0, 2.0]);
        let weights = [0.5, 0.5];

        assert!((impact(&doc, &doc_info, &weights) - 0.25).abs() < 1e-12);
        let score = term_doc_score(&doc, 1.0, &doc_info, &weights);
        assert!((score - 0.25).abs() < 1e-12);
    }
}
