//! Raw Token Definition
//!
//! The `RawToken` enum is the logos-derived tokenizer output before
//! provenance is attached and string payloads are unescaped.

use logos::Logos;

/// Raw token from logos (before provenance attachment).
///
/// Sprig's surface syntax only has four token classes: parentheses,
/// symbols, and string literals, with `;` line comments skipped here.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r]+")] // Skip horizontal whitespace
pub(crate) enum RawToken {
    #[regex(r";[^\n]*")]
    Comment,

    #[token("(")]
    OpenParen,

    #[token(")")]
    CloseParen,

    #[regex(r#""(\\.|[^"\\])*""#)]
    StringLit,

    // Anything that is not whitespace, a paren, a quote, or a comment start.
    // Sigils (:, &, ') are ordinary symbol characters.
    #[regex(r#"[^()\s";][^()\s"]*"#)]
    Symbol,
}
