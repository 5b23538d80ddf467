//! Search box query syntax
//!
//! Supports:
//! - `mobile device`: adjacent clauses, OR-ed
//! - `mobile AND device`: every operand must match
//! - `+mobile -stop NOT words`: mandatory, subtracted and inverted clauses
//! - `"stop words"`: phrases
//! - `title:forenote`, `title:(a b)`: field scoping
//! - `detec*`: suffix wildcards
//!
//! # Example
//!
//! ```rust
//! use morsel::config::TokenizerConfig;
//! use morsel::searcher::query_string::QueryStringParser;
//! use morsel::tokenizer::Tokenizer;
//!
//! let tokenizer = Tokenizer::new(&TokenizerConfig::default());
//! let parts = QueryStringParser::new("title:rust AND tutorial", &tokenizer)
//!     .unwrap()
//!     .parse()
//!     .unwrap();
//! assert_eq!(parts.len(), 1);
//! ```

pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Token};
pub use parser::{parse_free_text, QueryStringParser};
