//! Lexer for search box query strings

use crate::error::{MorselError, Result};

/// Token types for query string parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A term (unquoted word), possibly ending in `*`
    Term(String),
    /// A quoted string (phrase)
    QuotedString(String),

    /// AND operator
    And,
    /// OR operator; adjacent clauses are OR-ed without it too
    Or,
    /// NOT operator
    Not,
    /// Colon separator (field:value)
    Colon,

    /// Left parenthesis (grouping)
    LeftParen,
    /// Right parenthesis (grouping)
    RightParen,

    /// Plus sign (mandatory clause)
    Plus,
    /// Minus sign (subtracted clause)
    Minus,

    /// End of input
    Eof,
}

/// Lexer for tokenizing query strings.
///
/// Characters that cannot start a token are skipped, and an unterminated
/// quote runs to the end of the input: users type queries one keystroke at
/// a time.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token> {
        loop {
            self.skip_whitespace();

            if self.position >= self.input.len() {
                return Ok(Token::Eof);
            }

            let ch = self.current_char();
            let token = match ch {
                ':' => Token::Colon,
                '(' => Token::LeftParen,
                ')' => Token::RightParen,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '"' => {
                    self.advance();
                    return Ok(self.read_quoted_string());
                }
                _ if Self::is_term_start(ch) => return self.read_term(),
                _ => {
                    self.advance();
                    continue;
                }
            };
            self.advance();
            return Ok(token);
        }
    }

    /// Peek at the next token without consuming it
    pub fn peek_token(&mut self) -> Result<Token> {
        let saved_position = self.position;
        let token = self.next_token()?;
        self.position = saved_position;
        Ok(token)
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn read_term(&mut self) -> Result<Token> {
        let mut term = String::new();

        while self.position < self.input.len() {
            let ch = self.current_char();
            if Self::is_term_char(ch) {
                term.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if term.trim_end_matches('*').contains('*') {
            return Err(MorselError::QueryParse(format!(
                "wildcards are only supported at the end of a term: {}",
                term
            )));
        }

        // Operators are upper case only; "and" stays a search term
        match term.as_str() {
            "AND" => Ok(Token::And),
            "OR" => Ok(Token::Or),
            "NOT" => Ok(Token::Not),
            _ => Ok(Token::Term(term)),
        }
    }

    fn read_quoted_string(&mut self) -> Token {
        let mut s = String::new();

        while self.position < self.input.len() {
            let ch = self.current_char();
            self.advance();
            match ch {
                '"' => break,
                '\\' if self.position < self.input.len() => {
                    s.push(self.current_char());
                    self.advance();
                }
                _ => s.push(ch),
            }
        }

        Token::QuotedString(s)
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn is_term_start(ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_'
    }

    fn is_term_char(ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_' || ch == '-' || ch == '.' || ch == '\'' || ch == '*'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                return out;
            }
            out.push(token);
        }
    }

    #[test]
    fn test_simple_terms() {
        assert_eq!(
            tokens("hello world"),
            vec![Token::Term("hello".to_string()), Token::Term("world".to_string())]
        );
    }

    #[test]
    fn test_field_value() {
        assert_eq!(
            tokens("title:rust"),
            vec![
                Token::Term("title".to_string()),
                Token::Colon,
                Token::Term("rust".to_string())
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("+a -b NOT c AND (d OR e)"),
            vec![
                Token::Plus,
                Token::Term("a".to_string()),
                Token::Minus,
                Token::Term("b".to_string()),
                Token::Not,
                Token::Term("c".to_string()),
                Token::And,
                Token::LeftParen,
                Token::Term("d".to_string()),
                Token::Or,
                Token::Term("e".to_string()),
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn test_lowercase_keywords_are_terms() {
        assert_eq!(
            tokens("rock and roll"),
            vec![
                Token::Term("rock".to_string()),
                Token::Term("and".to_string()),
                Token::Term("roll".to_string())
            ]
        );
    }

    #[test]
    fn test_quoted_string() {
        assert_eq!(
            tokens("\"stop words\" x"),
            vec![
                Token::QuotedString("stop words".to_string()),
                Token::Term("x".to_string())
            ]
        );
        // Still being typed
        assert_eq!(tokens("\"stop wo"), vec![Token::QuotedString("stop wo".to_string())]);
    }

    #[test]
    fn test_wildcard_suffix() {
        assert_eq!(tokens("prog*"), vec![Token::Term("prog*".to_string())]);
        assert!(Lexer::new("pr*g").next_token().is_err());
    }

    #[test]
    fn test_stray_punctuation_is_skipped() {
        assert_eq!(
            tokens("what? ~rust!"),
            vec![Token::Term("what".to_string()), Token::Term("rust".to_string())]
        );
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new("a b");
        assert_eq!(lexer.peek_token().unwrap(), Token::Term("a".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::Term("a".to_string()));
        assert!(!lexer.is_eof());
    }
}
