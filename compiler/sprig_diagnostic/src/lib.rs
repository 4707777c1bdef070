//! Diagnostics blamed to source tokens.
//!
//! The rendered format is a contract for editor integration and must stay
//! byte-exact:
//!
//! ```text
//! file:line:col: error: message
//! file:line:col: note: message
//! ```
//!
//! Columns are 1-based. Errors are never exceptions: components emit a
//! diagnostic and bump an error count, so one compilation run reports many
//! errors. Color, when enabled, decorates only interactive terminal output;
//! piped output is always the plain parseable form.

mod emitter;

use sprig_lexer::Token;
use std::fmt;
use std::sync::Arc;

pub use emitter::{ColorMode, TerminalEmitter};

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Note => f.write_str("note"),
        }
    }
}

/// A single blamed message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    /// Build a diagnostic blamed to a token's start position.
    pub fn blamed(token: &Token, severity: Severity, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            file: Arc::clone(&token.source.file),
            line: token.source.line,
            column: token.source.column_start,
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.column, self.severity, self.message
        )
    }
}

/// Emit an error blamed to `token` on stderr.
pub fn emit_blamed_error(token: &Token, message: impl Into<String>) {
    eprintln!("{}", Diagnostic::blamed(token, Severity::Error, message));
}

/// Emit a warning blamed to `token` on stderr.
pub fn emit_blamed_warning(token: &Token, message: impl Into<String>) {
    eprintln!("{}", Diagnostic::blamed(token, Severity::Warning, message));
}

/// Emit a note blamed to `token` on stderr.
pub fn emit_blamed_note(token: &Token, message: impl Into<String>) {
    eprintln!("{}", Diagnostic::blamed(token, Severity::Note, message));
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_lexer::{SourceLoc, TokenKind};

    fn token_at(file: &str, line: u32, column: u32) -> Token {
        Token {
            kind: TokenKind::Symbol,
            contents: "x".to_string(),
            source: SourceLoc {
                file: Arc::from(file),
                line,
                column_start: column,
                column_end: column + 1,
            },
        }
    }

    #[test]
    fn test_format_is_byte_exact() {
        let diag = Diagnostic::blamed(
            &token_at("src/main.spr", 12, 5),
            Severity::Error,
            "unknown symbol 'foo'",
        );
        assert_eq!(
            diag.to_string(),
            "src/main.spr:12:5: error: unknown symbol 'foo'"
        );
    }

    #[test]
    fn test_note_severity_renders() {
        let diag = Diagnostic::blamed(&token_at("a.spr", 1, 1), Severity::Note, "defined here");
        assert_eq!(diag.to_string(), "a.spr:1:1: note: defined here");
    }

    #[test]
    fn test_format_round_trips_through_editor_regex() {
        // The one-line contract: ^([^:]+):(\d+):(\d+): (error|note): (.*)$
        let diag = Diagnostic::blamed(
            &token_at("mod.spr", 3, 9),
            Severity::Error,
            "bad arity: expected 3 arguments",
        );
        let rendered = diag.to_string();

        let (file, rest) = rendered.split_once(':').unwrap();
        let (line, rest) = rest.split_once(':').unwrap();
        let (column, rest) = rest.split_once(':').unwrap();
        let (severity, message) = rest
            .strip_prefix(' ')
            .unwrap()
            .split_once(": ")
            .unwrap();

        assert_eq!(file, "mod.spr");
        assert_eq!(line.parse::<u32>().unwrap(), 3);
        assert_eq!(column.parse::<u32>().unwrap(), 9);
        assert_eq!(severity, "error");
        assert_eq!(message, "bad arity: expected 3 arguments");
    }
}
