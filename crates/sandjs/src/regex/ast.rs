//! Regex pattern AST (§4.6), shaped after the node set in
//! `regex/parser.py`: one variant per grammar production, atoms flat,
//! groups/assertions/quantifiers wrapping a boxed body.

use std::fmt;

#[derive(Debug, Clone)]
pub enum Node {
    Char(char),
    Dot,
    CharClass { ranges: Vec<(u32, u32)>, negated: bool },
    Shorthand(ShorthandKind),
    Anchor(AnchorKind),
    Backref(u32),
    Group { body: Box<Node>, capturing: bool, group_index: u32 },
    Lookahead { body: Box<Node>, positive: bool },
    Lookbehind { body: Box<Node>, positive: bool },
    /// `max: None` means unbounded (`*`, `+`, `{n,}`).
    Quantifier { body: Box<Node>, min: u32, max: Option<u32>, greedy: bool },
    Alternative(Vec<Node>),
    Disjunction(Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShorthandKind {
    Digit,
    NotDigit,
    Word,
    NotWord,
    Space,
    NotSpace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    Start,
    End,
    Boundary,
    NotBoundary,
}

/// A pattern that failed to parse or compile (unterminated class/group,
/// invalid quantifier, invalid back-reference, §4.6).
#[derive(Debug, Clone)]
pub struct RegexError {
    pub message: String,
}

impl RegexError {
    pub(super) fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RegexError {}
