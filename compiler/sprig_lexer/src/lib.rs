//! Lexer for Sprig using logos.
//!
//! The surface syntax is a parenthesized symbolic dialect: the only token
//! classes are parentheses, symbols, and string literals, with `;` comments
//! running to end of line.
//!
//! # Lexing
//!
//! [`tokenize_line`] lexes a single line and appends tokens with full source
//! provenance (file, 1-based line, 1-based columns). [`tokenize_file_contents`]
//! is the whole-file loop used by the module loader. Neither validates
//! nesting; run [`validate_parentheses`] before handing tokens to anything
//! that walks expressions.
//!
//! # Ownership
//!
//! The module loader seals the finished vector into a [`TokenRun`] and the
//! run is immutable from then on. See [`token`] for the stability contract.

mod raw_token;
pub mod token;

use logos::Logos;
use raw_token::RawToken;
use std::fmt;
use std::sync::Arc;

pub use token::{SourceLoc, Token, TokenKind, TokenRun};

/// Error from tokenizing one line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub kind: LexErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexErrorKind {
    /// A `"` was opened but the line ended before it closed.
    UnterminatedString,
    /// A character no token class accepts.
    UnexpectedCharacter(char),
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LexErrorKind::UnterminatedString => {
                write!(f, "unterminated string")
            }
            LexErrorKind::UnexpectedCharacter(c) => {
                write!(f, "unexpected character '{c}'")
            }
        }
    }
}

impl std::error::Error for LexError {}

/// Error from parenthesis validation, blamed to the offending token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParenError {
    /// More opens than closes; blames the earliest unclosed open paren.
    UnclosedParen(Token),
    /// A close paren with no matching open.
    UnexpectedClose(Token),
}

impl fmt::Display for ParenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParenError::UnclosedParen(_) => f.write_str("unclosed parenthesis"),
            ParenError::UnexpectedClose(_) => {
                f.write_str("close parenthesis without a matching open")
            }
        }
    }
}

impl ParenError {
    /// The token the error blames.
    pub fn blame(&self) -> &Token {
        match self {
            ParenError::UnclosedParen(token) | ParenError::UnexpectedClose(token) => token,
        }
    }
}

impl std::error::Error for ParenError {}

/// Process escape sequences in a string literal payload.
///
/// Recognized escapes: `\n`, `\t`, `\r`, `\\`, `\"`, `\0`. Unrecognized
/// escapes are preserved literally (`\q` stays `\q`).
fn unescape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Tokenize a single line, appending to `tokens_out`.
///
/// `line_number` is 1-based. The lexer continues past nothing: the first
/// invalid character or unterminated string aborts the line, because a
/// malformed line would cascade into paren validation errors anyway.
pub fn tokenize_line(
    line: &str,
    file: &Arc<str>,
    line_number: u32,
    tokens_out: &mut Vec<Token>,
) -> Result<(), LexError> {
    let mut lexer = RawToken::lexer(line);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        // Columns are 1-based; span end is already exclusive.
        let source = SourceLoc {
            file: Arc::clone(file),
            line: line_number,
            column_start: span.start as u32 + 1,
            column_end: span.end as u32 + 1,
        };

        match result {
            Ok(RawToken::Comment) => break,
            Ok(RawToken::OpenParen) => tokens_out.push(Token {
                kind: TokenKind::OpenParen,
                contents: String::new(),
                source,
            }),
            Ok(RawToken::CloseParen) => tokens_out.push(Token {
                kind: TokenKind::CloseParen,
                contents: String::new(),
                source,
            }),
            Ok(RawToken::StringLit) => {
                let slice = lexer.slice();
                tokens_out.push(Token {
                    kind: TokenKind::String,
                    contents: unescape_string(&slice[1..slice.len() - 1]),
                    source,
                });
            }
            Ok(RawToken::Symbol) => tokens_out.push(Token {
                kind: TokenKind::Symbol,
                contents: lexer.slice().to_string(),
                source,
            }),
            Err(()) => {
                let slice = lexer.slice();
                let kind = if slice.starts_with('"') {
                    LexErrorKind::UnterminatedString
                } else {
                    LexErrorKind::UnexpectedCharacter(slice.chars().next().unwrap_or('?'))
                };
                return Err(LexError {
                    file: Arc::clone(file),
                    line: line_number,
                    column: span.start as u32 + 1,
                    kind,
                });
            }
        }
    }

    Ok(())
}

/// Tokenize a whole file's contents. Used by the module loader.
pub fn tokenize_file_contents(source: &str, file: &Arc<str>) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    for (index, line) in source.lines().enumerate() {
        tokenize_line(line, file, index as u32 + 1, &mut tokens)?;
    }
    Ok(tokens)
}

/// Check that parentheses balance and never close below depth zero.
///
/// Every component that walks expressions assumes this has passed; helpers
/// like matching-paren scans do not re-check.
pub fn validate_parentheses(tokens: &[Token]) -> Result<(), ParenError> {
    let mut open_stack: Vec<&Token> = Vec::new();
    for token in tokens {
        match token.kind {
            TokenKind::OpenParen => open_stack.push(token),
            TokenKind::CloseParen => {
                if open_stack.pop().is_none() {
                    return Err(ParenError::UnexpectedClose(token.clone()));
                }
            }
            _ => {}
        }
    }
    if let Some(unclosed) = open_stack.first() {
        return Err(ParenError::UnclosedParen((*unclosed).clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
