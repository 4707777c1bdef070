//! Final writer: flattens splices and renders fragments to C text.
//!
//! The writer is the only component that interprets modifier flags. It
//! flattens splice markers depth-first in insertion order per stream, tracks
//! block indentation, applies name-style conversion, and emits language
//! punctuation. Blame provenance travels with every fragment so writer
//! diagnostics can still point at Sprig source.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::converters::{convert_name, NameStyleSettings};
use crate::output::{GeneratorOutput, OutputContents, OutputModifiers, StringOutput};

/// Which of the two streams to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Source,
    Header,
}

/// Brace placement for `OPEN_BLOCK`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BraceStyle {
    /// `int main() {`
    #[default]
    EndOfLine,
    /// Allman style: brace on its own line.
    NextLine,
}

/// Indentation and brace formatting.
#[derive(Clone, Debug)]
pub struct WriterFormatSettings {
    pub indent: String,
    pub brace_style: BraceStyle,
}

impl Default for WriterFormatSettings {
    fn default() -> Self {
        WriterFormatSettings {
            indent: "    ".to_string(),
            brace_style: BraceStyle::EndOfLine,
        }
    }
}

/// Filenames and fixed heading/footer text for one module's output pair.
#[derive(Clone, Debug, Default)]
pub struct WriterOutputSettings {
    pub source_path: PathBuf,
    pub header_path: PathBuf,
    pub source_heading: String,
    pub source_footer: String,
    pub header_heading: String,
    pub header_footer: String,
}

/// Writer failure. Rendering itself cannot fail; only file IO can.
#[derive(Debug)]
pub struct WriterError {
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to write {}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

struct RenderState<'a> {
    out: String,
    depth: usize,
    at_line_start: bool,
    names: &'a NameStyleSettings,
    format: &'a WriterFormatSettings,
}

impl RenderState<'_> {
    /// Write a piece with indentation inserted at line starts. `piece` must
    /// not contain newlines; [`RenderState::newline`] owns those.
    fn piece(&mut self, piece: &str) {
        if piece.is_empty() {
            return;
        }
        if self.at_line_start {
            for _ in 0..self.depth {
                self.out.push_str(&self.format.indent);
            }
            self.at_line_start = false;
        }
        self.out.push_str(piece);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
    }

    fn space(&mut self) {
        if !self.at_line_start && !self.out.ends_with(' ') {
            self.out.push(' ');
        }
    }
}

/// Escape `text` as the body of a C string literal.
fn escape_c_string(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
}

fn stream_of(output: &GeneratorOutput, kind: StreamKind) -> &[StringOutput] {
    match kind {
        StreamKind::Source => &output.source,
        StreamKind::Header => &output.header,
    }
}

fn render_fragment(state: &mut RenderState<'_>, fragment: &StringOutput, kind: StreamKind) {
    let text = match &fragment.contents {
        OutputContents::Splice(cell) => {
            // Depth-first flatten in insertion order. A child empty on this
            // stream contributes nothing here even if its marker exists on
            // both streams.
            let child = cell.borrow();
            for child_fragment in stream_of(&child, kind) {
                render_fragment(state, child_fragment, kind);
            }
            return;
        }
        OutputContents::Text(text) => text,
    };

    let m = fragment.modifiers;
    if m.contains(OutputModifiers::CLOSE_BLOCK) {
        state.depth = state.depth.saturating_sub(1);
        state.piece("}");
        state.newline();
    }
    if m.contains(OutputModifiers::SPACE_BEFORE) {
        state.space();
    }
    if m.contains(OutputModifiers::OPEN_PAREN) {
        state.piece("(");
    }

    if !text.is_empty() {
        if m.contains(OutputModifiers::SURROUND_WITH_QUOTES) {
            let mut literal = String::with_capacity(text.len() + 2);
            literal.push('"');
            escape_c_string(text, &mut literal);
            literal.push('"');
            state.piece(&literal);
        } else if m.contains(OutputModifiers::CONVERT_TYPE_NAME) {
            state.piece(&convert_name(text, state.names.types));
        } else if m.contains(OutputModifiers::CONVERT_FUNCTION_NAME) {
            state.piece(&convert_name(text, state.names.functions));
        } else if m.contains(OutputModifiers::CONVERT_VARIABLE_NAME) {
            state.piece(&convert_name(text, state.names.variables));
        } else {
            state.piece(text);
        }
    }

    if m.contains(OutputModifiers::CLOSE_PAREN) {
        state.piece(")");
    }
    if m.contains(OutputModifiers::LIST_SEPARATOR) {
        state.piece(", ");
    }
    if m.contains(OutputModifiers::END_STATEMENT) {
        state.piece(";");
        state.newline();
    }
    if m.contains(OutputModifiers::OPEN_BLOCK) {
        match state.format.brace_style {
            BraceStyle::EndOfLine => {
                state.space();
                state.piece("{");
            }
            BraceStyle::NextLine => {
                if !state.at_line_start {
                    state.newline();
                }
                state.piece("{");
            }
        }
        state.newline();
        state.depth += 1;
    }
    if m.contains(OutputModifiers::SPACE_AFTER) {
        state.space();
    }
    if m.contains(OutputModifiers::NEWLINE_AFTER) {
        state.newline();
    }
}

/// Render one stream of `output` to text, flattening splices.
pub fn render_stream(
    output: &GeneratorOutput,
    kind: StreamKind,
    names: &NameStyleSettings,
    format: &WriterFormatSettings,
) -> String {
    let mut state = RenderState {
        out: String::new(),
        depth: 0,
        at_line_start: true,
        names,
        format,
    };
    for fragment in stream_of(output, kind) {
        render_fragment(&mut state, fragment, kind);
    }
    state.out
}

/// Collect the flattened fragment sequence of one stream, splices expanded.
///
/// Rendering consumes this order implicitly; tests assert on it directly.
pub fn flatten_stream(output: &GeneratorOutput, kind: StreamKind) -> Vec<StringOutput> {
    fn walk(output: &GeneratorOutput, kind: StreamKind, sink: &mut Vec<StringOutput>) {
        for fragment in stream_of(output, kind) {
            match &fragment.contents {
                OutputContents::Splice(cell) => walk(&cell.borrow(), kind, sink),
                OutputContents::Text(_) => sink.push(fragment.clone()),
            }
        }
    }
    let mut sink = Vec::new();
    walk(output, kind, &mut sink);
    sink
}

fn write_file(path: &Path, text: &str) -> Result<(), WriterError> {
    fs::write(path, text).map_err(|source| WriterError {
        path: path.to_path_buf(),
        source,
    })
}

/// Render both streams and write the source/header file pair.
pub fn write_generator_output(
    output: &GeneratorOutput,
    names: &NameStyleSettings,
    format: &WriterFormatSettings,
    settings: &WriterOutputSettings,
) -> Result<(), WriterError> {
    let mut source_text = String::new();
    source_text.push_str(&settings.source_heading);
    source_text.push_str(&render_stream(output, StreamKind::Source, names, format));
    source_text.push_str(&settings.source_footer);

    let mut header_text = String::from("#pragma once\n");
    header_text.push_str(&settings.header_heading);
    header_text.push_str(&render_stream(output, StreamKind::Header, names, format));
    header_text.push_str(&settings.header_footer);

    debug!(
        source = %settings.source_path.display(),
        header = %settings.header_path.display(),
        "writing generated output"
    );
    write_file(&settings.source_path, &source_text)?;
    write_file(&settings.header_path, &header_text)?;
    Ok(())
}
