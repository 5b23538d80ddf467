//! Parsed query tree

/// Node kinds of a parsed query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryPartKind {
    Term,
    /// Consecutive terms; children are `Term` parts
    Phrase,
    /// Parenthesized group; children combine like the top level
    Bracket,
    /// Every child must match
    And,
}

/// A non-primary term added by expansion, with its score weight
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedTerm {
    pub term: String,
    pub weight: f32,
}

/// One node of a parsed query
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPart {
    pub kind: QueryPartKind,
    /// `+clause`: results must match it
    pub is_mandatory: bool,
    /// `-clause`: matches are removed from the results
    pub is_subtracted: bool,
    /// `NOT clause`: matches every document the clause does not
    pub is_inverted: bool,
    /// `term*`: `terms` holds every dictionary term with the prefix
    pub is_suffix_wildcard: bool,
    pub is_corrected: bool,
    pub is_expanded: bool,
    /// `field:clause`; applies to every descendant
    pub field_name: Option<String>,
    /// The term as typed (normalized), before correction or wildcard
    /// enumeration
    pub original_term: Option<String>,
    /// Primary terms, scored at full weight
    pub terms: Vec<String>,
    pub expanded_terms: Vec<ExpandedTerm>,
    /// Position of a phrase child relative to the phrase's first word;
    /// stays put when a neighbouring child is dropped
    pub phrase_offset: u32,
    pub children: Vec<QueryPart>,
}

impl QueryPart {
    fn with_kind(kind: QueryPartKind) -> Self {
        Self {
            kind,
            is_mandatory: false,
            is_subtracted: false,
            is_inverted: false,
            is_suffix_wildcard: false,
            is_corrected: false,
            is_expanded: false,
            field_name: None,
            original_term: None,
            terms: Vec::new(),
            expanded_terms: Vec::new(),
            phrase_offset: 0,
            children: Vec::new(),
        }
    }

    pub fn term(term: impl Into<String>) -> Self {
        let term = term.into();
        let mut part = Self::with_kind(QueryPartKind::Term);
        part.original_term = Some(term.clone());
        part.terms.push(term);
        part
    }

    pub fn wildcard(prefix: impl Into<String>) -> Self {
        let mut part = Self::with_kind(QueryPartKind::Term);
        part.original_term = Some(prefix.into());
        part.is_suffix_wildcard = true;
        part
    }

    /// Phrase of consecutive words
    pub fn phrase(children: Vec<QueryPart>) -> Self {
        Self::phrase_at(children.into_iter().zip(0u32..).collect())
    }

    /// Phrase of words at the given token positions; only the distances
    /// between positions matter
    pub fn phrase_at(children: Vec<(QueryPart, u32)>) -> Self {
        let first = children.first().map_or(0, |(_, pos)| *pos);
        let mut part = Self::with_kind(QueryPartKind::Phrase);
        part.children = children
            .into_iter()
            .map(|(mut child, pos)| {
                child.phrase_offset = pos.saturating_sub(first);
                child
            })
            .collect();
        part
    }

    pub fn bracket(children: Vec<QueryPart>) -> Self {
        let mut part = Self::with_kind(QueryPartKind::Bracket);
        part.children = children;
        part
    }

    pub fn and(children: Vec<QueryPart>) -> Self {
        let mut part = Self::with_kind(QueryPartKind::And);
        part.children = children;
        part
    }

    /// Scope this part and its unscoped descendants to `field`
    pub fn scope_to_field(&mut self, field: &str) {
        if self.field_name.is_none() {
            self.field_name = Some(field.to_string());
        }
        for child in &mut self.children {
            child.scope_to_field(field);
        }
    }

    /// True when the part can no longer match anything
    pub fn is_empty(&self) -> bool {
        match self.kind {
            QueryPartKind::Term => self.terms.is_empty() && self.expanded_terms.is_empty(),
            _ => self.children.is_empty(),
        }
    }

    /// Whether the part contributes positively to results
    pub fn is_positive(&self) -> bool {
        !self.is_subtracted && !self.is_inverted
    }

    /// Every searched term of this subtree, primary and expanded, in order
    pub fn collect_terms<'a>(&'a self, out: &mut Vec<(&'a str, f32)>) {
        for term in &self.terms {
            out.push((term, 1.0));
        }
        for expanded in &self.expanded_terms {
            out.push((&expanded.term, expanded.weight));
        }
        for child in &self.children {
            child.collect_terms(out);
        }
    }

    /// Terms to highlight, grouped per `Term` part; subtracted and inverted
    /// parts are skipped
    pub fn collect_highlight_groups(&self, out: &mut Vec<Vec<String>>) {
        if !self.is_positive() {
            return;
        }
        if self.kind == QueryPartKind::Term {
            let group: Vec<String> = self
                .terms
                .iter()
                .cloned()
                .chain(self.expanded_terms.iter().map(|e| e.term.clone()))
                .collect();
            if !group.is_empty() {
                out.push(group);
            }
            return;
        }
        for child in &self.children {
            child.collect_highlight_groups(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_to_field_keeps_inner_scopes() {
        let mut inner = QueryPart::term("b");
        inner.field_name = Some("heading".to_string());
        let mut part = QueryPart::bracket(vec![QueryPart::term("a"), inner]);
        part.scope_to_field("title");

        assert_eq!(part.children[0].field_name.as_deref(), Some("title"));
        assert_eq!(part.children[1].field_name.as_deref(), Some("heading"));
    }

    #[test]
    fn test_highlight_groups_skip_negated() {
        let mut expanded = QueryPart::term("detec");
        expanded.terms.clear();
        expanded.expanded_terms.push(ExpandedTerm {
            term: "detection".to_string(),
            weight: 0.44,
        });
        let mut excluded = QueryPart::term("stop");
        excluded.is_subtracted = true;

        let mut groups = Vec::new();
        for part in [QueryPart::term("mobile"), expanded, excluded] {
            part.collect_highlight_groups(&mut groups);
        }
        assert_eq!(
            groups,
            vec![vec!["mobile".to_string()], vec!["detection".to_string()]]
        );
    }

    #[test]
    fn test_empty_parts() {
        assert!(QueryPart::wildcard("pro").is_empty());
        assert!(!QueryPart::term("pro").is_empty());
        assert!(QueryPart::and(vec![]).is_empty());
    }
}
