//! Token model with source provenance and sealed token runs.
//!
//! Tokens live in *sealed* vectors: a [`TokenRun`] is immutable from the
//! moment it is constructed, and cloning one is a cheap refcount bump. Every
//! cursor into a run (evaluator contexts, pending references, macro
//! expansions) clones the run, so the backing storage outlives all users
//! without any explicit invalidation protocol.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// The lexical class of a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    OpenParen,
    CloseParen,
    /// A bare symbol, including sigil-prefixed ones (`:tag`, `&return`, `'quoted`).
    Symbol,
    /// A string literal. `contents` holds the payload without the quotes.
    String,
}

impl TokenKind {
    /// Human-readable description used in diagnostics.
    pub fn description(self) -> &'static str {
        match self {
            TokenKind::OpenParen => "open parenthesis",
            TokenKind::CloseParen => "close parenthesis",
            TokenKind::Symbol => "symbol",
            TokenKind::String => "string",
        }
    }
}

/// Where a token came from.
///
/// `line` and columns are 1-based; `column_end` is exclusive. The filename is
/// shared rather than copied per token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: Arc<str>,
    pub line: u32,
    pub column_start: u32,
    pub column_end: u32,
}

impl SourceLoc {
    /// A location for tokens synthesized at compile time rather than lexed.
    pub fn generated(file: Arc<str>) -> Self {
        SourceLoc {
            file,
            line: 1,
            column_start: 1,
            column_end: 1,
        }
    }
}

/// The smallest lexed unit. Immutable after tokenization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Textual payload. Empty for parentheses; without quotes for strings.
    pub contents: String,
    pub source: SourceLoc,
}

impl Token {
    /// Construct a synthesized symbol token blaming the same location as `like`.
    ///
    /// Used by gensym and by generators that fabricate tokens; the fabricated
    /// token inherits the provenance of the code that caused it so
    /// diagnostics still point somewhere useful.
    pub fn synthesized_symbol(contents: impl Into<String>, like: &Token) -> Token {
        Token {
            kind: TokenKind::Symbol,
            contents: contents.into(),
            source: like.source.clone(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::OpenParen => f.write_str("("),
            TokenKind::CloseParen => f.write_str(")"),
            TokenKind::Symbol => f.write_str(&self.contents),
            TokenKind::String => write!(f, "\"{}\"", self.contents),
        }
    }
}

/// A sealed, immutable token vector.
///
/// Construction via [`TokenRun::seal`] is the only path; there is no way to
/// append afterwards. Cloning shares the backing storage, which is what makes
/// token addresses stable for as long as anyone holds a cursor.
#[derive(Clone)]
pub struct TokenRun(Arc<[Token]>);

impl TokenRun {
    /// Seal a token vector, transferring ownership into the run.
    pub fn seal(tokens: Vec<Token>) -> TokenRun {
        TokenRun(tokens.into())
    }

    /// Number of tokens in the run.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether two runs share the same backing storage.
    pub fn same_run(&self, other: &TokenRun) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for TokenRun {
    type Target = [Token];

    #[inline]
    fn deref(&self) -> &[Token] {
        &self.0
    }
}

// Render runs as the source text they correspond to; full token dumps drown
// out everything else in trace logs.
impl fmt::Debug for TokenRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenRun[{}](", self.0.len())?;
        for token in self.0.iter().take(8) {
            write!(f, " {token}")?;
        }
        if self.0.len() > 8 {
            f.write_str(" ...")?;
        }
        f.write_str(" )")
    }
}
