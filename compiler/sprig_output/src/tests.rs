use super::*;
use sprig_lexer::{SourceLoc, Token, TokenKind};
use std::sync::Arc;

fn tok(contents: &str) -> Token {
    Token {
        kind: TokenKind::Symbol,
        contents: contents.to_string(),
        source: SourceLoc {
            file: Arc::from("test.spr"),
            line: 1,
            column_start: 1,
            column_end: 1 + contents.len() as u32,
        },
    }
}

fn render_source(output: &GeneratorOutput) -> String {
    render_stream(
        output,
        StreamKind::Source,
        &NameStyleSettings::default(),
        &WriterFormatSettings::default(),
    )
}

#[test]
fn test_statement_rendering() {
    let mut output = GeneratorOutput::new();
    let blame = tok("return");
    add_string_output(&mut output.source, "return", OutputModifiers::SPACE_AFTER, &blame);
    add_string_output(&mut output.source, "0", OutputModifiers::NONE, &blame);
    add_lang_token_output(&mut output.source, OutputModifiers::END_STATEMENT, &blame);
    assert_eq!(render_source(&output), "return 0;\n");
}

#[test]
fn test_block_indentation() {
    let mut output = GeneratorOutput::new();
    let blame = tok("while");
    add_string_output(&mut output.source, "while", OutputModifiers::SPACE_AFTER, &blame);
    add_lang_token_output(&mut output.source, OutputModifiers::OPEN_PAREN, &blame);
    add_string_output(&mut output.source, "1", OutputModifiers::NONE, &blame);
    add_lang_token_output(
        &mut output.source,
        OutputModifiers::CLOSE_PAREN | OutputModifiers::OPEN_BLOCK,
        &blame,
    );
    add_string_output(&mut output.source, "step", OutputModifiers::NONE, &blame);
    add_lang_token_output(&mut output.source, OutputModifiers::END_STATEMENT, &blame);
    add_lang_token_output(&mut output.source, OutputModifiers::CLOSE_BLOCK, &blame);
    assert_eq!(render_source(&output), "while (1) {\n    step;\n}\n");
}

#[test]
fn test_next_line_brace_style() {
    let mut output = GeneratorOutput::new();
    let blame = tok("scope");
    add_lang_token_output(&mut output.source, OutputModifiers::OPEN_BLOCK, &blame);
    add_lang_token_output(&mut output.source, OutputModifiers::CLOSE_BLOCK, &blame);
    let format = WriterFormatSettings {
        brace_style: BraceStyle::NextLine,
        ..WriterFormatSettings::default()
    };
    let text = render_stream(
        &output,
        StreamKind::Source,
        &NameStyleSettings::default(),
        &format,
    );
    assert_eq!(text, "{\n}\n");
}

#[test]
fn test_string_literal_escaping() {
    let mut output = GeneratorOutput::new();
    let blame = tok("s");
    add_string_output(
        &mut output.source,
        "line\n\"quote\"",
        OutputModifiers::SURROUND_WITH_QUOTES,
        &blame,
    );
    assert_eq!(render_source(&output), "\"line\\n\\\"quote\\\"\"");
}

#[test]
fn test_name_conversion_applies_per_flag() {
    let mut output = GeneratorOutput::new();
    let blame = tok("t");
    add_string_output(
        &mut output.source,
        "my-type",
        OutputModifiers::CONVERT_TYPE_NAME | OutputModifiers::SPACE_AFTER,
        &blame,
    );
    add_string_output(
        &mut output.source,
        "my-var",
        OutputModifiers::CONVERT_VARIABLE_NAME,
        &blame,
    );
    assert_eq!(render_source(&output), "MyType myVar");
}

#[test]
fn test_splice_markers_go_to_both_streams() {
    let mut parent = GeneratorOutput::new();
    let child = OutputCell::new();
    add_splice_output(&mut parent, &child, &tok("defun"));
    assert_eq!(parent.source.len(), 1);
    assert_eq!(parent.header.len(), 1);
}

#[test]
fn test_splice_flattening_preserves_insertion_order() {
    let mut parent = GeneratorOutput::new();
    let blame = tok("m");
    add_string_output(&mut parent.source, "before", OutputModifiers::NONE, &blame);

    let child = OutputCell::new();
    add_string_output(
        &mut child.borrow_mut().source,
        "middle",
        OutputModifiers::NONE,
        &tok("child"),
    );
    add_splice_output(&mut parent, &child, &blame);
    add_string_output(&mut parent.source, "after", OutputModifiers::NONE, &blame);

    let flattened = flatten_stream(&parent, StreamKind::Source);
    let texts: Vec<&str> = flattened
        .iter()
        .map(|f| match &f.contents {
            OutputContents::Text(t) => t.as_str(),
            OutputContents::Splice(_) => unreachable!("flatten expands splices"),
        })
        .collect();
    assert_eq!(texts, vec!["before", "middle", "after"]);
}

#[test]
fn test_splice_rewrite_after_insertion_is_visible() {
    // The deferred-insertion property: content written to a cell after its
    // marker was spliced still renders, because flattening happens at write
    // time.
    let mut parent = GeneratorOutput::new();
    let child = OutputCell::new();
    add_splice_output(&mut parent, &child, &tok("f"));

    add_string_output(
        &mut child.borrow_mut().source,
        "late",
        OutputModifiers::NONE,
        &tok("late"),
    );
    assert_eq!(render_source(&parent), "late");

    child.borrow_mut().clear();
    add_string_output(
        &mut child.borrow_mut().source,
        "rewritten",
        OutputModifiers::NONE,
        &tok("rewritten"),
    );
    assert_eq!(render_source(&parent), "rewritten");
}

#[test]
fn test_splice_child_empty_on_one_stream() {
    // Marker exists on both streams; the empty header side is a no-op.
    let mut parent = GeneratorOutput::new();
    let child = OutputCell::new();
    add_string_output(
        &mut child.borrow_mut().source,
        "source-only",
        OutputModifiers::NONE,
        &tok("x"),
    );
    add_splice_output(&mut parent, &child, &tok("x"));

    assert_eq!(render_source(&parent), "source-only");
    let header = render_stream(
        &parent,
        StreamKind::Header,
        &NameStyleSettings::default(),
        &WriterFormatSettings::default(),
    );
    assert_eq!(header, "");
}

#[test]
fn test_write_generator_output_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut output = GeneratorOutput::new();
    let blame = tok("x");
    add_string_output(&mut output.source, "int x", OutputModifiers::END_STATEMENT, &blame);
    add_string_output(
        &mut output.header,
        "extern int x",
        OutputModifiers::END_STATEMENT,
        &blame,
    );

    let settings = WriterOutputSettings {
        source_path: dir.path().join("out.c"),
        header_path: dir.path().join("out.h"),
        source_heading: "#include \"out.h\"\n".to_string(),
        ..WriterOutputSettings::default()
    };
    write_generator_output(
        &output,
        &NameStyleSettings::default(),
        &WriterFormatSettings::default(),
        &settings,
    )
    .expect("write");

    let source = std::fs::read_to_string(dir.path().join("out.c")).unwrap();
    let header = std::fs::read_to_string(dir.path().join("out.h")).unwrap();
    assert_eq!(source, "#include \"out.h\"\nint x;\n");
    assert_eq!(header, "#pragma once\nextern int x;\n");
}
