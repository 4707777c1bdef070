//! Terminal emitter with optional ANSI color support.
//!
//! Colors decorate only the severity word; the surrounding text stays
//! byte-identical to the plain format so piped output remains parseable.

use std::io::{self, IsTerminal, Write};

use crate::{Diagnostic, Severity};

/// ANSI color codes for terminal output.
mod colors {
    pub const ERROR: &str = "\x1b[1;31m"; // Bold red
    pub const WARNING: &str = "\x1b[1;33m"; // Bold yellow
    pub const NOTE: &str = "\x1b[1;36m"; // Bold cyan
    pub const RESET: &str = "\x1b[0m";
}

/// Color output mode for the terminal emitter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorMode {
    /// Automatically detect based on terminal capabilities.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

impl ColorMode {
    /// Resolve to a boolean based on terminal detection.
    pub fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Auto => io::stderr().is_terminal(),
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

/// Writes diagnostics to a sink, optionally colored.
pub struct TerminalEmitter<W: Write> {
    writer: W,
    colors: bool,
}

impl<W: Write> TerminalEmitter<W> {
    /// Create a new terminal emitter with explicit color mode.
    pub fn with_color_mode(writer: W, mode: ColorMode) -> Self {
        TerminalEmitter {
            writer,
            colors: mode.should_use_colors(),
        }
    }

    /// Create a new terminal emitter.
    pub fn new(writer: W, colors: bool) -> Self {
        TerminalEmitter { writer, colors }
    }

    /// Create a terminal emitter for stderr with auto-detected color support.
    pub fn stderr() -> TerminalEmitter<io::Stderr> {
        TerminalEmitter {
            writer: io::stderr(),
            colors: ColorMode::Auto.should_use_colors(),
        }
    }

    fn write_severity(&mut self, severity: Severity) {
        if self.colors {
            let color = match severity {
                Severity::Error => colors::ERROR,
                Severity::Warning => colors::WARNING,
                Severity::Note => colors::NOTE,
            };
            let _ = write!(self.writer, "{color}{severity}{}", colors::RESET);
        } else {
            let _ = write!(self.writer, "{severity}");
        }
    }

    /// Emit one diagnostic.
    pub fn emit(&mut self, diagnostic: &Diagnostic) {
        let _ = write!(
            self.writer,
            "{}:{}:{}: ",
            diagnostic.file, diagnostic.line, diagnostic.column
        );
        self.write_severity(diagnostic.severity);
        let _ = writeln!(self.writer, ": {}", diagnostic.message);
    }

    /// Emit a closing summary line (`N errors, M warnings`).
    pub fn emit_summary(&mut self, errors: u32, warnings: u32) {
        if errors == 0 && warnings == 0 {
            return;
        }
        let error_plural = if errors == 1 { "" } else { "s" };
        let warning_plural = if warnings == 1 { "" } else { "s" };
        let _ = writeln!(
            self.writer,
            "{errors} error{error_plural}, {warnings} warning{warning_plural}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_lexer::{SourceLoc, Token, TokenKind};
    use std::sync::Arc;

    fn sample_diagnostic() -> Diagnostic {
        let token = Token {
            kind: TokenKind::Symbol,
            contents: "oops".to_string(),
            source: SourceLoc {
                file: Arc::from("x.spr"),
                line: 2,
                column_start: 4,
                column_end: 8,
            },
        };
        Diagnostic::blamed(&token, Severity::Error, "bad form")
    }

    #[test]
    fn test_plain_output_matches_display() {
        let mut buffer = Vec::new();
        TerminalEmitter::new(&mut buffer, false).emit(&sample_diagnostic());
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "x.spr:2:4: error: bad form\n"
        );
    }

    #[test]
    fn test_colored_output_only_decorates_severity() {
        let mut buffer = Vec::new();
        TerminalEmitter::new(&mut buffer, true).emit(&sample_diagnostic());
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("x.spr:2:4: "));
        assert!(text.contains("\x1b[1;31merror\x1b[0m"));
        assert!(text.ends_with(": bad form\n"));
    }

    #[test]
    fn test_summary_pluralization() {
        let mut buffer = Vec::new();
        TerminalEmitter::new(&mut buffer, false).emit_summary(1, 2);
        assert_eq!(String::from_utf8(buffer).unwrap(), "1 error, 2 warnings\n");
    }
}
