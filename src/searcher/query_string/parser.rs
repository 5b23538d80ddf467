//! Recursive descent parser for query strings
//!
//! # Grammar
//!
//! ```text
//! query       := clauses EOF
//! clauses     := and_expr (OR? and_expr)*
//! and_expr    := unary (AND unary)*
//! unary       := (NOT | '-' | '+') unary | primary
//! primary     := field_query | grouped | phrase | term
//! field_query := TERM COLON (grouped | phrase | term)
//! grouped     := '(' clauses ')'
//! ```
//!
//! Adjacent clauses are OR-ed. Term text goes through the index tokenizer;
//! a word that splits into several terms becomes a phrase, and a word that
//! normalizes to nothing is dropped.

use super::lexer::{Lexer, Token};
use crate::error::{MorselError, Result};
use crate::searcher::query_part::QueryPart;
use crate::tokenizer::Tokenizer;

/// Parser for search box query strings
pub struct QueryStringParser<'a> {
    lexer: Lexer,
    current_token: Token,
    tokenizer: &'a Tokenizer,
    /// Names accepted before `:`; any name when empty
    fields: Vec<String>,
}

impl<'a> QueryStringParser<'a> {
    pub fn new(input: &str, tokenizer: &'a Tokenizer) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;

        Ok(Self {
            lexer,
            current_token,
            tokenizer,
            fields: Vec::new(),
        })
    }

    /// Restrict `field:` prefixes to the given names
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// Parse the query string into its top-level clauses
    pub fn parse(&mut self) -> Result<Vec<QueryPart>> {
        let parts = self.parse_clauses()?;

        if self.current_token != Token::Eof {
            return Err(MorselError::QueryParse(format!(
                "unexpected token after query: {:?}",
                self.current_token
            )));
        }

        Ok(parts)
    }

    /// Parse: clauses := and_expr (OR? and_expr)*
    fn parse_clauses(&mut self) -> Result<Vec<QueryPart>> {
        let mut clauses = Vec::new();

        loop {
            match self.current_token {
                Token::Eof | Token::RightParen => break,
                Token::Or => self.advance()?,
                _ => {
                    if let Some(part) = self.parse_and_expr()? {
                        clauses.push(part);
                    }
                }
            }
        }

        Ok(clauses)
    }

    /// Parse: and_expr := unary (AND unary)*
    fn parse_and_expr(&mut self) -> Result<Option<QueryPart>> {
        let mut operands: Vec<QueryPart> = self.parse_unary()?.into_iter().collect();

        while self.current_token == Token::And {
            self.advance()?;
            if let Some(part) = self.parse_unary()? {
                operands.push(part);
            }
        }

        Ok(match operands.len() {
            0 => None,
            1 => operands.pop(),
            _ => Some(QueryPart::and(operands)),
        })
    }

    /// Parse: unary := (NOT | '-' | '+') unary | primary
    fn parse_unary(&mut self) -> Result<Option<QueryPart>> {
        match self.current_token {
            Token::Not => {
                self.advance()?;
                Ok(self.parse_unary()?.map(|mut p| {
                    p.is_inverted = true;
                    p
                }))
            }
            Token::Minus => {
                self.advance()?;
                Ok(self.parse_unary()?.map(|mut p| {
                    p.is_subtracted = true;
                    p
                }))
            }
            Token::Plus => {
                self.advance()?;
                Ok(self.parse_unary()?.map(|mut p| {
                    p.is_mandatory = true;
                    p
                }))
            }
            _ => self.parse_primary(),
        }
    }

    /// Parse: primary := field_query | grouped | phrase | term
    fn parse_primary(&mut self) -> Result<Option<QueryPart>> {
        match &self.current_token {
            Token::LeftParen => self.parse_grouped(),
            Token::QuotedString(text) => {
                let text = text.clone();
                self.advance()?;
                Ok(self.phrase_from_text(&text))
            }
            Token::Term(term) => {
                let term = term.clone();
                self.advance()?;

                if self.current_token == Token::Colon {
                    self.advance()?;
                    self.parse_field_value(&term)
                } else {
                    Ok(self.term_from_word(&term))
                }
            }
            Token::Eof => Ok(None),
            _ => Err(MorselError::QueryParse(format!(
                "unexpected token: {:?}",
                self.current_token
            ))),
        }
    }

    /// Parse: grouped := '(' clauses ')'
    fn parse_grouped(&mut self) -> Result<Option<QueryPart>> {
        self.advance()?;
        let children = self.parse_clauses()?;
        match self.current_token {
            Token::RightParen => self.advance()?,
            // Unclosed group at the end of a query still being typed
            Token::Eof => {}
            _ => {
                return Err(MorselError::QueryParse(format!(
                    "expected ')', got {:?}",
                    self.current_token
                )))
            }
        }
        Ok((!children.is_empty()).then(|| QueryPart::bracket(children)))
    }

    /// Parse field value after `field:`
    fn parse_field_value(&mut self, field: &str) -> Result<Option<QueryPart>> {
        if !self.fields.is_empty() && !self.fields.iter().any(|f| f == field) {
            return Err(MorselError::UnknownField(field.to_string()));
        }

        let part = match &self.current_token {
            Token::LeftParen => self.parse_grouped()?,
            Token::QuotedString(text) => {
                let text = text.clone();
                self.advance()?;
                self.phrase_from_text(&text)
            }
            Token::Term(term) => {
                let term = term.clone();
                self.advance()?;
                self.term_from_word(&term)
            }
            _ => {
                return Err(MorselError::QueryParse(format!(
                    "expected value after '{}:', got {:?}",
                    field, self.current_token
                )))
            }
        };

        Ok(part.map(|mut p| {
            p.scope_to_field(field);
            p
        }))
    }

    fn term_from_word(&self, word: &str) -> Option<QueryPart> {
        let is_wildcard = word.ends_with('*');
        let mut terms = self
            .tokenizer
            .tokenize_with_positions_ordered(word.trim_end_matches('*'));

        match terms.len() {
            0 => None,
            1 => {
                let (term, _) = terms.pop()?;
                Some(if is_wildcard {
                    QueryPart::wildcard(term)
                } else {
                    QueryPart::term(term)
                })
            }
            _ => {
                let last = terms.len() - 1;
                let children = terms
                    .into_iter()
                    .enumerate()
                    .map(|(i, (t, pos))| {
                        let child = if is_wildcard && i == last {
                            QueryPart::wildcard(t)
                        } else {
                            QueryPart::term(t)
                        };
                        (child, pos)
                    })
                    .collect();
                Some(QueryPart::phrase_at(children))
            }
        }
    }

    fn phrase_from_text(&self, text: &str) -> Option<QueryPart> {
        let mut children: Vec<(QueryPart, u32)> = self
            .tokenizer
            .tokenize_with_positions_ordered(text)
            .into_iter()
            .map(|(t, pos)| (QueryPart::term(t), pos))
            .collect();
        match children.len() {
            0 => None,
            1 => children.pop().map(|(child, _)| child),
            _ => Some(QueryPart::phrase_at(children)),
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }
}

/// Treat the whole input as OR-ed free text terms, ignoring all operators
pub fn parse_free_text(input: &str, tokenizer: &Tokenizer) -> Vec<QueryPart> {
    tokenizer
        .tokenize(input)
        .into_iter()
        .map(QueryPart::term)
        .collect()
}
