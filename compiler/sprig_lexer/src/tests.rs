use super::*;
use std::sync::Arc;

fn lex(source: &str) -> Vec<Token> {
    let file: Arc<str> = Arc::from("test.spr");
    tokenize_file_contents(source, &file).expect("lex failure")
}

fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
    tokens.iter().map(|t| t.kind).collect()
}

#[test]
fn test_tokenize_simple_form() {
    let tokens = lex("(defun add (a int) (return a))");
    assert_eq!(tokens[0].kind, TokenKind::OpenParen);
    assert_eq!(tokens[1].contents, "defun");
    assert_eq!(tokens[2].contents, "add");
    assert_eq!(tokens.last().unwrap().kind, TokenKind::CloseParen);
}

#[test]
fn test_tokenize_sigil_symbols() {
    let tokens = lex("(&return :tag 'quoted)");
    assert_eq!(tokens[1].contents, "&return");
    assert_eq!(tokens[2].contents, ":tag");
    assert_eq!(tokens[3].contents, "'quoted");
    assert!(tokens[1..4].iter().all(|t| t.kind == TokenKind::Symbol));
}

#[test]
fn test_tokenize_string_escapes() {
    let tokens = lex(r#"(print "line\n\"quoted\"")"#);
    assert_eq!(tokens[2].kind, TokenKind::String);
    assert_eq!(tokens[2].contents, "line\n\"quoted\"");
}

#[test]
fn test_unknown_escape_preserved() {
    let tokens = lex(r#""a\qb""#);
    assert_eq!(tokens[0].contents, "a\\qb");
}

#[test]
fn test_comment_runs_to_end_of_line() {
    let tokens = lex("(a) ; comment (not tokens)\n(b)");
    assert_eq!(
        kinds(&tokens),
        vec![
            TokenKind::OpenParen,
            TokenKind::Symbol,
            TokenKind::CloseParen,
            TokenKind::OpenParen,
            TokenKind::Symbol,
            TokenKind::CloseParen,
        ]
    );
}

#[test]
fn test_provenance_columns_one_based() {
    let tokens = lex("(foo bar)");
    // '(' at column 1, 'foo' at columns 2..5, 'bar' at 6..9.
    assert_eq!(tokens[0].source.column_start, 1);
    assert_eq!(tokens[1].source.column_start, 2);
    assert_eq!(tokens[1].source.column_end, 5);
    assert_eq!(tokens[2].source.column_start, 6);
    assert_eq!(tokens[0].source.line, 1);
}

#[test]
fn test_provenance_line_numbers() {
    let tokens = lex("(a)\n(b)\n(c)");
    assert_eq!(tokens[0].source.line, 1);
    assert_eq!(tokens[3].source.line, 2);
    assert_eq!(tokens[6].source.line, 3);
}

#[test]
fn test_unterminated_string_errors() {
    let file: Arc<str> = Arc::from("test.spr");
    let mut out = Vec::new();
    let error = tokenize_line(r#"(print "oops)"#, &file, 3, &mut out).unwrap_err();
    assert_eq!(error.kind, LexErrorKind::UnterminatedString);
    assert_eq!(error.line, 3);
}

#[test]
fn test_validate_balanced() {
    assert!(validate_parentheses(&lex("(a (b (c)) d)")).is_ok());
}

#[test]
fn test_validate_unclosed_blames_earliest_open() {
    let error = validate_parentheses(&lex("(a (b)")).unwrap_err();
    match error {
        ParenError::UnclosedParen(token) => assert_eq!(token.source.column_start, 1),
        other => panic!("expected UnclosedParen, got {other:?}"),
    }
}

#[test]
fn test_validate_early_close() {
    let error = validate_parentheses(&lex("(a))")).unwrap_err();
    assert!(matches!(error, ParenError::UnexpectedClose(_)));
}

#[test]
fn test_token_run_seal_and_share() {
    let run = TokenRun::seal(lex("(a b)"));
    let clone = run.clone();
    assert!(run.same_run(&clone));
    assert_eq!(run.len(), 4);
    // The clone keeps the storage alive independently of the original.
    drop(run);
    assert_eq!(clone[1].contents, "a");
}

#[test]
fn test_token_display_round_trip() {
    let tokens = lex(r#"(say "hi")"#);
    let rendered: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    assert_eq!(rendered, vec!["(", "say", "\"hi\"", ")"]);
}
