//! Scoring a preprocessed query tree over fetched postings

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use roaring::RoaringBitmap;

use super::dictionary::Dictionary;
use super::query_part::{QueryPart, QueryPartKind};
use crate::codec::{DocInfo, TermDoc};
use crate::fields::FieldInfos;
use crate::scoring;

/// Matched documents and their scores
pub type DocScores = BTreeMap<u32, f64>;

/// Everything evaluation reads: index statistics plus the decoded postings
/// of every searched term
pub struct MatchContext<'a> {
    pub dictionary: &'a Dictionary,
    pub doc_info: &'a DocInfo,
    pub field_infos: &'a FieldInfos,
    pub weights: &'a [f32],
    pub deleted: &'a RoaringBitmap,
    pub num_docs: u32,
    pub postings: &'a HashMap<String, Vec<TermDoc>>,
}

impl MatchContext<'_> {
    fn field_id(&self, part: &QueryPart) -> Option<Option<u8>> {
        match &part.field_name {
            None => Some(None),
            Some(name) => self.field_infos.get(name).map(|f| Some(f.id)),
        }
    }

    /// Live postings of `term`, restricted to `field` when given
    fn term_docs<'b>(&'b self, term: &str, field: Option<u8>) -> impl Iterator<Item = Cow<'b, TermDoc>> + 'b {
        self.postings
            .get(term)
            .map(|docs| docs.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|doc| !self.deleted.contains(doc.doc_id))
            .filter_map(move |doc| match field {
                None => Some(Cow::Borrowed(doc)),
                Some(id) => doc.field(id).map(|f| {
                    Cow::Owned(TermDoc {
                        doc_id: doc.doc_id,
                        fields: vec![f.clone()],
                    })
                }),
            })
    }

    fn universe(&self) -> DocScores {
        (0..self.num_docs)
            .filter(|id| !self.deleted.contains(*id))
            .map(|id| (id, 0.0))
            .collect()
    }
}

/// Evaluate a list of sibling clauses (the top level or a bracket).
///
/// Plain clauses are OR-ed. When mandatory clauses exist, only documents
/// matching all of them remain. Subtracted clauses remove their matches.
pub fn evaluate_clauses(parts: &[QueryPart], ctx: &MatchContext<'_>) -> DocScores {
    let mut optional = DocScores::new();
    let mut mandatory: Option<DocScores> = None;
    let mut removed: Vec<DocScores> = Vec::new();

    for part in parts {
        let matches = evaluate_with_inversion(part, ctx);
        if part.is_subtracted {
            removed.push(matches);
        } else if part.is_mandatory {
            mandatory = Some(match mandatory {
                None => matches,
                Some(acc) => intersect(acc, &matches),
            });
        } else {
            add_into(&mut optional, &matches);
        }
    }

    let mut result = match mandatory {
        None => optional,
        Some(mut required) => {
            for (doc_id, score) in required.iter_mut() {
                if let Some(extra) = optional.get(doc_id) {
                    *score += extra;
                }
            }
            required
        }
    };

    for matches in &removed {
        result.retain(|doc_id, _| !matches.contains_key(doc_id));
    }
    result
}

fn evaluate_with_inversion(part: &QueryPart, ctx: &MatchContext<'_>) -> DocScores {
    let matches = evaluate_part(part, ctx);
    if !part.is_inverted {
        return matches;
    }
    let mut inverted = ctx.universe();
    inverted.retain(|doc_id, _| !matches.contains_key(doc_id));
    inverted
}

fn evaluate_part(part: &QueryPart, ctx: &MatchContext<'_>) -> DocScores {
    match part.kind {
        QueryPartKind::Term => evaluate_term(part, ctx),
        QueryPartKind::Phrase => evaluate_phrase(part, ctx),
        QueryPartKind::Bracket => evaluate_clauses(&part.children, ctx),
        QueryPartKind::And => evaluate_and(&part.children, ctx),
    }
}

fn evaluate_term(part: &QueryPart, ctx: &MatchContext<'_>) -> DocScores {
    let mut scores = DocScores::new();
    let Some(field) = ctx.field_id(part) else {
        return scores;
    };

    let weighted = part
        .terms
        .iter()
        .map(|t| (t.as_str(), 1.0f32))
        .chain(part.expanded_terms.iter().map(|e| (e.term.as_str(), e.weight)));

    for (term, weight) in weighted {
        let Some(info) = ctx.dictionary.get(term) else {
            continue;
        };
        let idf = scoring::idf(ctx.num_docs, info.doc_freq);
        for doc in ctx.term_docs(term, field) {
            let score = scoring::term_doc_score(&doc, idf, ctx.doc_info, ctx.weights);
            *scores.entry(doc.doc_id).or_default() += score * weight as f64;
        }
    }
    scores
}

/// Positions per field of every term of a phrase child, merged
fn child_positions(part: &QueryPart, ctx: &MatchContext<'_>) -> HashMap<u32, HashMap<u8, Vec<u32>>> {
    let mut positions: HashMap<u32, HashMap<u8, Vec<u32>>> = HashMap::new();
    let Some(field) = ctx.field_id(part) else {
        return positions;
    };
    for term in &part.terms {
        for doc in ctx.term_docs(term, field) {
            let fields = positions.entry(doc.doc_id).or_default();
            for f in &doc.fields {
                fields.entry(f.field_id).or_default().extend(&f.positions);
            }
        }
    }
    positions
}

/// Documents where the children occur at their phrase offsets within one
/// field; the score is the sum of the children's scores
fn evaluate_phrase(part: &QueryPart, ctx: &MatchContext<'_>) -> DocScores {
    if part.children.len() == 1 {
        return evaluate_term(&part.children[0], ctx);
    }

    let positions: Vec<_> = part
        .children
        .iter()
        .map(|child| child_positions(child, ctx))
        .collect();
    let Some((first, rest)) = positions.split_first() else {
        return DocScores::new();
    };
    let base = part.children[0].phrase_offset;
    let gaps: Vec<u32> = part.children[1..]
        .iter()
        .map(|c| c.phrase_offset.saturating_sub(base))
        .collect();

    let matched: Vec<u32> = first
        .iter()
        .filter(|(doc_id, fields)| {
            fields.iter().any(|(field_id, starts)| {
                starts.iter().any(|&start| {
                    rest.iter().zip(&gaps).all(|(child, gap)| {
                        child
                            .get(*doc_id)
                            .and_then(|f| f.get(field_id))
                            .is_some_and(|p| p.contains(&(start + gap)))
                    })
                })
            })
        })
        .map(|(doc_id, _)| *doc_id)
        .collect();

    let mut scores = DocScores::new();
    for child in &part.children {
        let child_scores = evaluate_term(child, ctx);
        for doc_id in &matched {
            *scores.entry(*doc_id).or_default() += child_scores.get(doc_id).copied().unwrap_or(0.0);
        }
    }
    scores
}

/// Documents matching every child; subtracted children remove matches
fn evaluate_and(children: &[QueryPart], ctx: &MatchContext<'_>) -> DocScores {
    let mut result: Option<DocScores> = None;
    let mut removed: Vec<DocScores> = Vec::new();

    for child in children {
        let matches = evaluate_with_inversion(child, ctx);
        if child.is_subtracted {
            removed.push(matches);
            continue;
        }
        result = Some(match result {
            None => matches,
            Some(acc) => intersect(acc, &matches),
        });
    }

    let mut result = result.unwrap_or_default();
    for matches in &removed {
        result.retain(|doc_id, _| !matches.contains_key(doc_id));
    }
    result
}

fn intersect(mut acc: DocScores, other: &DocScores) -> DocScores {
    acc.retain(|doc_id, _| other.contains_key(doc_id));
    for (doc_id, score) in acc.iter_mut() {
        *score += other[doc_id];
    }
    acc
}

fn add_into(acc: &mut DocScores, other: &DocScores) {
    for (doc_id, score) in other {
        *acc.entry(*doc_id).or_default() += score;
    }
}
