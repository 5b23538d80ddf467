//! Query preprocessing against the dictionary: wildcard enumeration,
//! spelling correction and expansion of the last free text term

use tracing::debug;

use super::dictionary::Dictionary;
use super::query_part::{ExpandedTerm, QueryPart, QueryPartKind};
use crate::config::SearcherConfig;

/// Path (child indices from the top level) of the term that gets expanded.
///
/// Only the final part is considered, descending into the last child of a
/// group. Nothing is expanded when that part is a phrase, a wildcard, or
/// subtracted or inverted.
fn last_free_term(parts: &[QueryPart]) -> Option<Vec<usize>> {
    let i = parts.len().checked_sub(1)?;
    let part = &parts[i];
    if !part.is_positive() {
        return None;
    }
    match part.kind {
        QueryPartKind::Term if !part.is_suffix_wildcard => Some(vec![i]),
        QueryPartKind::Bracket | QueryPartKind::And => {
            let mut path = last_free_term(&part.children)?;
            path.insert(0, i);
            Some(path)
        }
        _ => None,
    }
}

/// Resolve every term of `parts` against the dictionary.
///
/// Terms missing from the dictionary are replaced by their closest
/// correction or dropped; parts left with nothing to match are removed
/// from their parent. With `expand_last`, the last free text term also
/// searches for longer terms it is a prefix of.
pub fn preprocess(
    parts: &mut Vec<QueryPart>,
    dict: &Dictionary,
    config: &SearcherConfig,
    expand_last: bool,
) {
    let target = if expand_last && config.max_term_expansions > 0 {
        last_free_term(parts)
    } else {
        None
    };
    resolve_parts(parts, dict, config, target.as_deref());
}

fn resolve_parts(
    parts: &mut Vec<QueryPart>,
    dict: &Dictionary,
    config: &SearcherConfig,
    target: Option<&[usize]>,
) {
    for (i, part) in parts.iter_mut().enumerate() {
        let target_here = target.and_then(|t| match t.split_first() {
            Some((&head, rest)) if head == i => Some(rest),
            _ => None,
        });

        match part.kind {
            QueryPartKind::Term => {
                resolve_term(part, dict, config, target_here.is_some_and(|t| t.is_empty()))
            }
            QueryPartKind::Phrase => {
                for child in &mut part.children {
                    resolve_term(child, dict, config, false);
                }
                part.children.retain(|c| !c.is_empty());
            }
            QueryPartKind::Bracket | QueryPartKind::And => {
                resolve_parts(&mut part.children, dict, config, target_here)
            }
        }
    }

    parts.retain(|p| !p.is_empty());
}

fn resolve_term(part: &mut QueryPart, dict: &Dictionary, config: &SearcherConfig, expand: bool) {
    let Some(original) = part.original_term.clone() else {
        return;
    };

    if part.is_suffix_wildcard {
        part.terms = dict
            .scan_prefix(&original)
            .map(|(t, _)| t.to_string())
            .collect();
        debug!(prefix = %original, matches = part.terms.len(), "enumerated wildcard");
        return;
    }

    if dict.get(&original).is_some() {
        if expand {
            add_expansions(part, &original, dict, config);
        }
        return;
    }

    part.terms.clear();
    if expand && add_expansions(part, &original, dict, config) {
        return;
    }

    match dict.correct(&original, config.max_edit_distance) {
        Some(corrected) => {
            debug!(term = %original, corrected, "corrected term");
            part.terms.push(corrected.to_string());
            part.is_corrected = true;
        }
        None => debug!(term = %original, "dropping term with no dictionary match"),
    }
}

/// Add weighted expansions of `term`; the weight shrinks with the share of
/// the expanded term the user actually typed
fn add_expansions(part: &mut QueryPart, term: &str, dict: &Dictionary, config: &SearcherConfig) -> bool {
    let typed = term.chars().count() as f32;
    for (expanded, _) in dict.expansions(term, config.max_term_expansions) {
        let weight = typed / expanded.chars().count() as f32 * config.expansion_weight;
        part.expanded_terms.push(ExpandedTerm {
            term: expanded.to_string(),
            weight,
        });
    }
    part.is_expanded = !part.expanded_terms.is_empty();
    part.is_expanded
}
