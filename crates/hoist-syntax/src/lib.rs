//! Python syntax for hoist.
//!
//! This crate provides a lossless-enough Python 3 front end for refactoring:
//! - an indentation-aware lexer,
//! - an error-tolerant recursive-descent parser producing an arena tree
//!   ([`ast::Module`]) whose nodes carry byte ranges into the original text,
//! - child enumeration helpers ([`visit`]).
//!
//! Comments and formatting are not represented in the tree; refactorings edit
//! the original text through ranges instead of pretty-printing nodes.

pub mod ast;
mod lexer;
mod parser;
pub mod visit;

use serde::{Deserialize, Serialize};

pub use lexer::{is_identifier, is_keyword, lex, Keyword, Token, TokenKind};
pub use parser::parse;

/// Half-open byte range `[start, end)` into a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "invalid range {start}..{end}");
        Self { start, end }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether `other` lies entirely within `self`.
    #[must_use]
    pub fn contains(&self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    #[must_use]
    pub fn contains_offset(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message} at {}..{}", range.start, range.end)]
pub struct ParseError {
    pub message: String,
    pub range: TextRange,
}

#[derive(Debug, Clone)]
pub struct ParseResult {
    pub module: ast::Module,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests;
