//! In-memory dictionary with prefix scans, trigram spelling correction and
//! ranked term expansion

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::codec::{DictionaryReader, TermInfo};
use crate::error::Result;

/// Decoded dictionary of a loaded index
#[derive(Debug, Default)]
pub struct Dictionary {
    /// Sorted by byte order, as written
    terms: Vec<String>,
    infos: Vec<TermInfo>,
    index: HashMap<String, u32>,
    /// Trigram -> ids of terms containing it
    trigrams: HashMap<String, Vec<u32>>,
}

fn trigrams(term: &str) -> Vec<String> {
    let chars: Vec<char> = term.chars().collect();
    let mut grams: Vec<String> = chars.windows(3).map(|w| w.iter().collect()).collect();
    grams.sort();
    grams.dedup();
    grams
}

impl Dictionary {
    /// Decode the `dictionaryString` and `dictionaryTable` streams
    pub fn decode(strings: &[u8], table: &[u8]) -> Result<Self> {
        let mut reader = DictionaryReader::new(strings, table);
        let mut dict = Self::default();

        while let Some((term, info)) = reader.next_entry()? {
            let id = dict.terms.len() as u32;
            for gram in trigrams(&term) {
                dict.trigrams.entry(gram).or_default().push(id);
            }
            dict.index.insert(term.clone(), id);
            dict.terms.push(term);
            dict.infos.push(info);
        }

        Ok(dict)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&TermInfo> {
        self.index.get(term).map(|&id| &self.infos[id as usize])
    }

    /// Every term starting with `prefix`, in dictionary order
    pub fn scan_prefix(&self, prefix: &str) -> impl Iterator<Item = (&str, &TermInfo)> {
        let start = self.terms.partition_point(|t| t.as_str() < prefix);
        let end = start
            + self.terms[start..]
                .iter()
                .take_while(|t| t.starts_with(prefix))
                .count();
        self.terms[start..end]
            .iter()
            .zip(&self.infos[start..end])
            .map(|(t, i)| (t.as_str(), i))
    }

    /// Closest dictionary term to an unknown `term`.
    ///
    /// Candidates share at least one trigram and lie within `max_edit`
    /// edits. They rank by shared trigrams (descending), then edit distance
    /// (ascending), then document frequency (descending).
    pub fn correct(&self, term: &str, max_edit: usize) -> Option<&str> {
        let mut overlap: HashMap<u32, usize> = HashMap::new();
        for gram in trigrams(term) {
            if let Some(ids) = self.trigrams.get(&gram) {
                for &id in ids {
                    *overlap.entry(id).or_default() += 1;
                }
            }
        }

        overlap
            .into_iter()
            .filter_map(|(id, shared)| {
                let candidate = &self.terms[id as usize];
                let distance = levenshtein_distance(term, candidate);
                (distance <= max_edit && candidate != term).then_some((id, shared, distance))
            })
            .min_by_key(|&(id, shared, distance)| {
                (
                    Reverse(shared),
                    distance,
                    Reverse(self.infos[id as usize].doc_freq),
                    id,
                )
            })
            .map(|(id, _, _)| self.terms[id as usize].as_str())
    }

    /// Up to `limit` longer terms starting with `term`, highest
    /// `max_term_score` first
    pub fn expansions(&self, term: &str, limit: usize) -> Vec<(&str, &TermInfo)> {
        let mut candidates: Vec<(&str, &TermInfo)> =
            self.scan_prefix(term).filter(|(t, _)| *t != term).collect();
        candidates.sort_by(|a, b| b.1.max_term_score.total_cmp(&a.1.max_term_score));
        candidates.truncate(limit);
        candidates
    }
}

/// Levenshtein edit distance over chars, two-row dynamic programming
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    let (shorter, longer) = if s1_chars.len() <= s2_chars.len() {
        (&s1_chars, &s2_chars)
    } else {
        (&s2_chars, &s1_chars)
    };
    if shorter.is_empty() {
        return longer.len();
    }

    let mut prev_row: Vec<usize> = (0..=shorter.len()).collect();
    let mut curr_row = vec![0; shorter.len() + 1];

    for i in 1..=longer.len() {
        curr_row[0] = i;
        for j in 1..=shorter.len() {
            let cost = usize::from(longer[i - 1] != shorter[j - 1]);
            curr_row[j] = (prev_row[j] + 1)
                .min(curr_row[j - 1] + 1)
                .min(prev_row[j - 1] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[shorter.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_term_strings, encode_term_table};

    fn dictionary(entries: &[(&str, u32, f32)]) -> Dictionary {
        let terms: Vec<&str> = entries.iter().map(|e| e.0).collect();
        let infos: Vec<TermInfo> = entries
            .iter()
            .map(|&(_, doc_freq, max_term_score)| TermInfo {
                doc_freq,
                max_term_score,
                ..Default::default()
            })
            .collect();
        Dictionary::decode(
            &encode_term_strings(&terms, 3).unwrap(),
            &encode_term_table(&infos).unwrap(),
        )
        .unwrap()
    }

    fn sample() -> Dictionary {
        dictionary(&[
            ("detection", 1, 0.4),
            ("detector", 3, 0.9),
            ("device", 1, 0.5),
            ("forenote", 2, 0.3),
            ("mobile", 1, 0.5),
            ("on", 2, 0.1),
            ("stop", 1, 0.5),
            ("words", 1, 0.5),
        ])
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("fornote", "forenote"), 1);
        assert_eq!(levenshtein_distance("café", "cafe"), 1);
    }

    #[test]
    fn test_get_and_scan_prefix() {
        let dict = sample();
        assert_eq!(dict.len(), 8);
        assert_eq!(dict.get("device").unwrap().doc_freq, 1);
        assert!(dict.get("devic").is_none());

        let detec: Vec<&str> = dict.scan_prefix("detec").map(|(t, _)| t).collect();
        assert_eq!(detec, vec!["detection", "detector"]);
        assert_eq!(dict.scan_prefix("zzz").count(), 0);
    }

    #[test]
    fn test_correction() {
        let dict = sample();
        assert_eq!(dict.correct("fornote", 2), Some("forenote"));
        assert_eq!(dict.correct("mobil", 2), Some("mobile"));
        // Too far from anything
        assert_eq!(dict.correct("xylophone", 2), None);
        // No trigrams to go on
        assert_eq!(dict.correct("of", 2), None);
    }

    #[test]
    fn test_correction_prefers_frequent_on_ties() {
        let dict = dictionary(&[("cart", 1, 0.1), ("cast", 5, 0.1)]);
        // Only "cart" shares a trigram with "cars"
        assert_eq!(dict.correct("cars", 1), Some("cart"));
        let dict = dictionary(&[("bart", 1, 0.1), ("cart", 5, 0.1)]);
        // both share "art" and are one edit away
        assert_eq!(dict.correct("dart", 1), Some("cart"));
    }

    #[test]
    fn test_expansions_ranked_by_max_score() {
        let dict = sample();
        let expanded: Vec<&str> = dict.expansions("detec", 3).into_iter().map(|(t, _)| t).collect();
        assert_eq!(expanded, vec!["detector", "detection"]);
        assert_eq!(dict.expansions("detec", 1).len(), 1);
        assert!(dict.expansions("device", 3).is_empty());
    }
}
