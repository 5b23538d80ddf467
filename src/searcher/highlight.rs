//! Result highlighting: best match window, excerpts and heading linking

use std::ops::Range;

use regex::Regex;
use serde::Serialize;

use crate::config::SearcherConfig;
use crate::error::{MorselError, Result};

const ELLIPSIS: &str = "…";

/// Case-insensitive matchers, one per group of searched terms
#[derive(Debug)]
pub struct TermMatcher {
    regexes: Vec<Regex>,
}

impl TermMatcher {
    /// Each group matches any of its terms at a word start; the rest of
    /// the word is part of the match
    pub fn new(groups: &[Vec<String>]) -> Result<Self> {
        let regexes = groups
            .iter()
            .filter(|g| !g.is_empty())
            .map(|group| {
                let mut alternatives: Vec<&String> = group.iter().collect();
                alternatives.sort_by_key(|t| std::cmp::Reverse(t.len()));
                let pattern = alternatives
                    .iter()
                    .map(|t| regex::escape(t))
                    .collect::<Vec<_>>()
                    .join("|");
                Regex::new(&format!(r"(?i)\b(?:{})\w*", pattern))
                    .map_err(|e| MorselError::Internal(format!("highlight pattern: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { regexes })
    }

    pub fn num_groups(&self) -> usize {
        self.regexes.len()
    }

    /// Match ranges per group, each in text order
    pub fn group_matches(&self, text: &str) -> Vec<Vec<Range<usize>>> {
        self.regexes
            .iter()
            .map(|re| re.find_iter(text).map(|m| m.range()).collect())
            .collect()
    }

    /// Non-overlapping matches of any group inside `span`
    fn matches_within(&self, text: &str, span: Range<usize>) -> Vec<Range<usize>> {
        let mut all: Vec<Range<usize>> = self
            .regexes
            .iter()
            .flat_map(|re| re.find_iter(&text[span.clone()]))
            .map(|m| span.start + m.start()..span.start + m.end())
            .collect();
        all.sort_by_key(|r| (r.start, std::cmp::Reverse(r.end)));

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(all.len());
        for range in all {
            match merged.last_mut() {
                Some(last) if range.start < last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        merged
    }
}

/// The densest stretch of text covering the most term groups
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchWindow {
    /// Number of distinct term groups inside the window
    pub coverage: usize,
    pub start: usize,
    pub end: usize,
    /// One match per covered group, in text order
    pub matches: Vec<Range<usize>>,
}

/// Find the best match window.
///
/// Sweeps every group's matches in order of their end position, always
/// advancing the group whose next match ends first. After each step the
/// window spans the current match of every group seen so far. A window
/// replaces the best one when it covers more groups, or as many groups in
/// less text; the first window found wins ties.
pub fn best_window(group_matches: &[Vec<Range<usize>>]) -> Option<MatchWindow> {
    let mut cursors: Vec<Option<usize>> = vec![None; group_matches.len()];
    let mut best: Option<MatchWindow> = None;

    loop {
        let next = group_matches
            .iter()
            .enumerate()
            .filter_map(|(g, matches)| {
                let idx = cursors[g].map_or(0, |c| c + 1);
                matches.get(idx).map(|m| (m.end, g, idx))
            })
            .min();
        let Some((_, group, idx)) = next else {
            break;
        };
        cursors[group] = Some(idx);

        let mut current: Vec<Range<usize>> = cursors
            .iter()
            .enumerate()
            .filter_map(|(g, c)| c.map(|i| group_matches[g][i].clone()))
            .collect();
        current.sort_by_key(|r| r.start);

        let coverage = current.len();
        let start = current.iter().map(|r| r.start).min().unwrap_or(0);
        let end = current.iter().map(|r| r.end).max().unwrap_or(0);

        let better = match &best {
            None => true,
            Some(b) => coverage > b.coverage || (coverage == b.coverage && end - start < b.end - b.start),
        };
        if better {
            best = Some(MatchWindow {
                coverage,
                start,
                end,
                matches: current,
            });
        }
    }

    best
}

/// Excerpt text with highlighted byte ranges
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Excerpt {
    pub text: String,
    pub highlights: Vec<Range<usize>>,
}

impl Excerpt {
    /// Wrap each highlight in `open` and `close`
    pub fn render(&self, open: &str, close: &str) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut last = 0;
        for range in &self.highlights {
            out.push_str(&self.text[last..range.start]);
            out.push_str(open);
            out.push_str(&self.text[range.clone()]);
            out.push_str(close);
            last = range.end;
        }
        out.push_str(&self.text[last..]);
        out
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

fn char_before(text: &str, idx: usize) -> Option<char> {
    text[..idx].chars().next_back()
}

fn char_at(text: &str, idx: usize) -> Option<char> {
    text[idx..].chars().next()
}

fn retreat_chars(text: &str, idx: usize, n: usize) -> usize {
    if n == 0 {
        return idx;
    }
    text[..idx]
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map_or(idx, |(i, _)| i)
}

fn advance_chars(text: &str, idx: usize, n: usize) -> usize {
    text[idx..]
        .char_indices()
        .nth(n)
        .map_or(text.len(), |(i, _)| idx + i)
}

/// Move a context start off a partial word, never past `limit`
fn trim_start(text: &str, mut start: usize, limit: usize) -> usize {
    let mid_word = char_before(text, start).is_some_and(is_word_char)
        && char_at(text, start).is_some_and(is_word_char);
    if mid_word {
        while start < limit {
            match char_at(text, start) {
                Some(c) if is_word_char(c) => start += c.len_utf8(),
                _ => break,
            }
        }
    }
    while start < limit {
        match char_at(text, start) {
            Some(c) if c.is_whitespace() => start += c.len_utf8(),
            _ => break,
        }
    }
    start
}

/// Move a context end off a partial word, never before `limit`
fn trim_end(text: &str, mut end: usize, limit: usize) -> usize {
    let mid_word = char_before(text, end).is_some_and(is_word_char)
        && char_at(text, end).is_some_and(is_word_char);
    if mid_word {
        while end > limit {
            match char_before(text, end) {
                Some(c) if is_word_char(c) => end -= c.len_utf8(),
                _ => break,
            }
        }
    }
    while end > limit {
        match char_before(text, end) {
            Some(c) if c.is_whitespace() => end -= c.len_utf8(),
            _ => break,
        }
    }
    end
}

/// Build an excerpt around the window's matches.
///
/// Each match gets up to `context` chars on either side, trimmed to whole
/// words. Overlapping spans merge, the text is cut at `max_len` chars, and
/// omitted text is marked with an ellipsis.
pub fn build_excerpt(
    text: &str,
    window: &MatchWindow,
    matcher: &TermMatcher,
    context: usize,
    max_len: usize,
) -> Excerpt {
    // Each span keeps its first match so a budget cut can keep it in view
    let mut spans: Vec<(Range<usize>, Range<usize>)> = Vec::new();
    for m in &window.matches {
        let start = trim_start(text, retreat_chars(text, m.start, context), m.start);
        let end = trim_end(text, advance_chars(text, m.end, context), m.end);
        match spans.last_mut() {
            Some((last, _)) if start <= last.end => last.end = last.end.max(end),
            _ => spans.push((start..end, m.clone())),
        }
    }

    let mut excerpt = Excerpt::default();
    let mut budget = max_len;
    let mut last_end = 0;
    for (i, (span, first)) in spans.into_iter().enumerate() {
        if budget == 0 {
            break;
        }

        let (start, end) = if text[span.clone()].chars().count() <= budget {
            budget -= text[span.clone()].chars().count();
            (span.start, span.end)
        } else {
            // Half of what the first match leaves goes before it
            let spare = budget.saturating_sub(text[first.clone()].chars().count());
            let lead = retreat_chars(text, first.start, spare / 2).max(span.start);
            let start = trim_start(text, lead, first.start);
            let cut = advance_chars(text, start, budget).min(span.end);
            let end = if first.end <= cut {
                trim_end(text, cut, first.end)
            } else {
                cut
            };
            budget = 0;
            (start, end)
        };

        if i == 0 && start > 0 {
            excerpt.text.push_str(ELLIPSIS);
        } else if i > 0 {
            excerpt.text.push(' ');
            excerpt.text.push_str(ELLIPSIS);
            excerpt.text.push(' ');
        }

        let offset = excerpt.text.len();
        for m in matcher.matches_within(text, start..end) {
            excerpt
                .highlights
                .push(offset + m.start - start..offset + m.end - start);
        }
        excerpt.text.push_str(&text[start..end]);
        last_end = end;
    }
    if last_end < text.len() && !excerpt.text.is_empty() {
        excerpt.text.push_str(ELLIPSIS);
    }

    excerpt
}

/// Opening text of a field, cut at a word boundary
fn leading_excerpt(text: &str, max_len: usize) -> Excerpt {
    let cut = advance_chars(text, 0, max_len);
    let mut excerpt = Excerpt::default();
    if cut >= text.len() {
        excerpt.text = text.trim_end().to_string();
    } else {
        let end = trim_end(text, cut, 0);
        excerpt.text = format!("{}{}", &text[..end], ELLIPSIS);
    }
    excerpt
}

/// A highlighted body excerpt with the heading it falls under
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HighlightedExcerpt {
    pub field: String,
    pub excerpt: Excerpt,
    pub heading: Option<String>,
    /// Anchor of the heading, when the document recorded one
    pub heading_link: Option<String>,
    pub coverage: usize,
}

/// Highlight a document's body fields.
///
/// Every body value gets its best window; the values covering the most term
/// groups are kept, each linked to the closest heading before it. A heading
/// links to the `headingLink` value directly before it. When nothing
/// matches, the opening of the first body value is returned unhighlighted.
pub fn highlight_document(
    fields: &[(String, String)],
    matcher: &TermMatcher,
    config: &SearcherConfig,
) -> Vec<HighlightedExcerpt> {
    let mut excerpts = Vec::new();

    for (i, (name, text)) in fields.iter().enumerate() {
        if *name != config.body_field {
            continue;
        }
        let Some(window) = best_window(&matcher.group_matches(text)) else {
            continue;
        };

        let heading_idx = fields[..i]
            .iter()
            .rposition(|(n, _)| *n == config.heading_field);
        let heading_link = heading_idx
            .and_then(|h| h.checked_sub(1))
            .filter(|&l| fields[l].0 == config.heading_link_field)
            .map(|l| fields[l].1.clone());

        excerpts.push(HighlightedExcerpt {
            field: name.clone(),
            excerpt: build_excerpt(
                text,
                &window,
                matcher,
                config.excerpt_context,
                config.max_excerpt_len,
            ),
            heading: heading_idx.map(|h| fields[h].1.clone()),
            heading_link,
            coverage: window.coverage,
        });
    }

    if excerpts.is_empty() {
        if let Some((name, text)) = fields.iter().find(|(n, _)| *n == config.body_field) {
            excerpts.push(HighlightedExcerpt {
                field: name.clone(),
                excerpt: leading_excerpt(text, config.max_excerpt_len),
                heading: None,
                heading_link: None,
                coverage: 0,
            });
        }
        return excerpts;
    }

    excerpts.sort_by_key(|e| std::cmp::Reverse(e.coverage));
    excerpts.truncate(config.max_excerpts_per_doc);
    excerpts
}
