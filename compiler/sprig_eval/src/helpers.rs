//! Helpers every generator builds on: paren navigation, argument iteration,
//! and blamed expectation checks.
//!
//! There is no materialized syntax tree; generators address code as
//! (run, start, end) ranges and walk siblings with [`get_next_argument`].
//! All `expect_*` functions emit the standard blamed diagnostic themselves
//! and return false, so call sites read as straight-line preconditions.

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{Token, TokenKind, TokenRun};

use crate::environment::ObjectDefinition;
use crate::evaluator::{EvaluatorContext, EvaluatorScope};

/// Advance past the outer parens of an invocation to the inner range.
pub fn strip_invocation(start: &mut usize, end: &mut usize) {
    *start += 1;
    *end = end.saturating_sub(1);
}

/// Index of the close paren matching the open paren at `start`.
///
/// Precondition: the run passed parenthesis validation, so the scan cannot
/// run off the end. A non-paren `start` (a bare invocation) yields the
/// degenerate range `start`, which downstream argument helpers treat as an
/// empty argument list.
pub fn find_close_paren_token_index(tokens: &[Token], start: usize) -> usize {
    if tokens[start].kind != TokenKind::OpenParen {
        return start;
    }
    let mut depth = 0i32;
    let mut index = start;
    while index < tokens.len() {
        match tokens[index].kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth -= 1;
                if depth == 0 {
                    return index;
                }
            }
            _ => {}
        }
        index += 1;
    }
    // Unreachable on validated runs; returning the end keeps callers sane.
    tokens.len() - 1
}

/// The head token of an invocation: the symbol after the open paren, or the
/// token itself for a bare invocation.
pub fn invocation_head(tokens: &[Token], start: usize) -> &Token {
    if tokens[start].kind == TokenKind::OpenParen {
        &tokens[start + 1]
    } else {
        &tokens[start]
    }
}

/// True if the symbol starts with `:`, `&`, or `'`.
pub fn is_special_symbol(token: &Token) -> bool {
    token.kind == TokenKind::Symbol
        && matches!(token.contents.chars().next(), Some(':') | Some('&') | Some('\''))
}

/// Index just past the argument starting at `current`, or `end` when the
/// arguments are exhausted.
pub fn get_next_argument(tokens: &[Token], current: usize, end: usize) -> usize {
    if current >= end {
        return end;
    }
    let next = match tokens[current].kind {
        TokenKind::OpenParen => find_close_paren_token_index(tokens, current) + 1,
        _ => current + 1,
    };
    next.min(end)
}

/// Index of the `desired`th argument of the invocation opening at `start`.
/// Argument 0 is the invocation head. `None` when out of range.
pub fn get_argument(
    tokens: &[Token],
    start: usize,
    desired: usize,
    end: usize,
) -> Option<usize> {
    let mut index = start + 1; // head
    let mut argument = 0;
    while index < end {
        if argument == desired {
            return Some(index);
        }
        index = get_next_argument(tokens, index, end);
        argument += 1;
    }
    None
}

/// Like [`get_argument`], but emits a blamed error naming what was expected.
pub fn get_expected_argument(
    message: &str,
    tokens: &[Token],
    start: usize,
    desired: usize,
    end: usize,
) -> Option<usize> {
    let found = get_argument(tokens, start, desired, end);
    if found.is_none() {
        emit_blamed_error(&tokens[start], format!("expected {message}"));
    }
    found
}

/// Number of arguments of the invocation at `start`, including the head.
pub fn get_num_arguments(tokens: &[Token], start: usize, end: usize) -> usize {
    let mut index = start + 1;
    let mut count = 0;
    while index < end {
        count += 1;
        index = get_next_argument(tokens, index, end);
    }
    count
}

/// Check the exact argument count (head included), with a blamed error.
pub fn expect_num_arguments(
    tokens: &[Token],
    start: usize,
    end: usize,
    expected: usize,
) -> bool {
    let count = get_num_arguments(tokens, start, end);
    if count != expected {
        emit_blamed_error(
            &tokens[start],
            format!("expected {expected} arguments, got {count}"),
        );
        return false;
    }
    true
}

/// Whether the argument at `index` is the last one before `end`.
pub fn is_last_argument(tokens: &[Token], index: usize, end: usize) -> bool {
    get_next_argument(tokens, index, end) >= end
}

/// Check a token's kind, with a blamed error naming the generator.
pub fn expect_token_type(
    generator_name: &str,
    token: &Token,
    expected: TokenKind,
) -> bool {
    if token.kind != expected {
        emit_blamed_error(
            token,
            format!(
                "{generator_name} expected {}, got {}",
                expected.description(),
                token.kind.description()
            ),
        );
        return false;
    }
    true
}

/// Check the evaluator scope, with a blamed error naming the generator.
pub fn expect_evaluator_scope(
    generator_name: &str,
    token: &Token,
    context: &EvaluatorContext,
    expected: EvaluatorScope,
) -> bool {
    if context.scope != expected {
        emit_blamed_error(
            token,
            format!(
                "{generator_name} must be invoked in {} scope, but is in {} scope",
                expected.description(),
                context.scope.description()
            ),
        );
        return false;
    }
    true
}

/// Inverse scope check: error when the scope *is* `forbidden`.
pub fn is_forbidden_evaluator_scope(
    generator_name: &str,
    token: &Token,
    context: &EvaluatorContext,
    forbidden: EvaluatorScope,
) -> bool {
    if context.scope == forbidden {
        emit_blamed_error(
            token,
            format!(
                "{generator_name} cannot be invoked in {} scope",
                forbidden.description()
            ),
        );
        return true;
    }
    false
}

/// Error when `index` has run past the end of the invocation.
pub fn expect_in_invocation(
    message: &str,
    tokens: &[Token],
    index: usize,
    end_invocation: usize,
) -> bool {
    if index >= end_invocation {
        emit_blamed_error(&tokens[end_invocation], format!("expected {message}"));
        return false;
    }
    true
}

/// If the token at `start` opens a `scope` block, advance past the `scope`
/// head. Used when a generator has already opened a block itself and the
/// body should not open a second one.
pub fn block_absorb_scope(tokens: &[Token], start: usize) -> usize {
    if tokens[start].kind == TokenKind::OpenParen {
        let head = start + 1;
        if head < tokens.len()
            && tokens[head].kind == TokenKind::Symbol
            && tokens[head].contents == "scope"
        {
            return head + 1;
        }
    }
    start
}

/// Append the whole expression starting at `start` (one atom, or a balanced
/// paren range) to `output`.
pub fn push_back_token_expression(output: &mut Vec<Token>, tokens: &[Token], start: usize) {
    match tokens[start].kind {
        TokenKind::OpenParen => {
            let end = find_close_paren_token_index(tokens, start);
            output.extend_from_slice(&tokens[start..=end]);
        }
        _ => output.push(tokens[start].clone()),
    }
}

/// Copy a definition's whole defining form with recorded macro expansions
/// substituted in.
///
/// Hooks use this to iterate over a snapshot while mutating the live table:
/// the copy references no live environment storage, so
/// [`crate::hooks::replace_and_evaluate_definition`] is free to rewrite the
/// original underneath it.
pub fn create_definition_copy_macro_expanded(
    definition: &ObjectDefinition,
    output: &mut Vec<Token>,
) -> bool {
    let Some((run, start)) = &definition.invocation else {
        emit_blamed_error(
            &definition.name,
            format!(
                "'{}' has no recorded invocation to copy",
                definition.name.contents
            ),
        );
        return false;
    };
    copy_expression_expanded(definition, run, *start, output);
    true
}

fn copy_expression_expanded(
    definition: &ObjectDefinition,
    run: &TokenRun,
    start: usize,
    output: &mut Vec<Token>,
) {
    if let Some(expansion) = definition
        .macro_expansions
        .iter()
        .find(|e| e.site_run.same_run(run) && e.site_start == start)
    {
        // Replace the invocation with its expansion; expansions may nest.
        copy_expression_expanded(definition, &expansion.expansion.clone(), 0, output);
        return;
    }

    match run[start].kind {
        TokenKind::OpenParen => {
            let end = find_close_paren_token_index(run, start);
            output.push(run[start].clone());
            let mut index = start + 1;
            while index < end {
                copy_expression_expanded(definition, run, index, output);
                index = get_next_argument(run, index, end);
            }
            output.push(run[end].clone());
        }
        _ => output.push(run[start].clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_lexer::tokenize_file_contents;
    use std::sync::Arc;

    fn lex(source: &str) -> Vec<Token> {
        let file: Arc<str> = Arc::from("helpers.spr");
        tokenize_file_contents(source, &file).expect("test source must lex")
    }

    #[test]
    fn test_argument_iteration_skips_nested_expressions() {
        let tokens = lex("(head a (nested b c) d)");
        let end = find_close_paren_token_index(&tokens, 0);
        assert_eq!(end, tokens.len() - 1);

        assert_eq!(get_argument(&tokens, 0, 0, end), Some(1)); // head
        assert_eq!(get_argument(&tokens, 0, 1, end), Some(2)); // a
        assert_eq!(get_argument(&tokens, 0, 2, end), Some(3)); // (nested ...)
        assert_eq!(get_argument(&tokens, 0, 3, end), Some(8)); // d
        assert_eq!(get_argument(&tokens, 0, 4, end), None);
        assert_eq!(get_num_arguments(&tokens, 0, end), 4);
    }

    #[test]
    fn test_is_last_argument() {
        let tokens = lex("(head a b)");
        let end = find_close_paren_token_index(&tokens, 0);
        assert!(!is_last_argument(&tokens, 2, end));
        assert!(is_last_argument(&tokens, 3, end));
    }

    #[test]
    fn test_strip_invocation_narrows_to_inner_range() {
        let tokens = lex("(head a)");
        let mut start = 0;
        let mut end = find_close_paren_token_index(&tokens, 0);
        strip_invocation(&mut start, &mut end);
        assert_eq!(tokens[start].contents, "head");
        assert_eq!(tokens[end].contents, "a");
    }

    #[test]
    fn test_expect_in_invocation_bounds() {
        let tokens = lex("(head a)");
        let end = find_close_paren_token_index(&tokens, 0);
        assert!(expect_in_invocation("an argument", &tokens, 2, end));
        assert!(!expect_in_invocation("an argument", &tokens, end, end));
    }

    #[test]
    fn test_is_special_symbol_sigils() {
        let tokens = lex("(x :tag &return 'quoted plain)");
        assert!(!is_special_symbol(&tokens[1]));
        assert!(is_special_symbol(&tokens[2]));
        assert!(is_special_symbol(&tokens[3]));
        assert!(is_special_symbol(&tokens[4]));
        assert!(!is_special_symbol(&tokens[5]));
    }

    #[test]
    fn test_block_absorb_scope() {
        let tokens = lex("((scope a b))");
        // The inner form opens a scope block; absorbing lands on its first
        // statement.
        let absorbed = block_absorb_scope(&tokens, 1);
        assert_eq!(tokens[absorbed].contents, "a");

        let plain = lex("((other a))");
        assert_eq!(block_absorb_scope(&plain, 1), 1);
    }

    #[test]
    fn test_push_back_token_expression_copies_whole_form() {
        let tokens = lex("(head (a b) c)");
        let mut copied = Vec::new();
        push_back_token_expression(&mut copied, &tokens, 2);
        let spelled: Vec<&str> = copied.iter().map(|t| t.contents.as_str()).collect();
        assert_eq!(spelled, vec!["", "a", "b", ""]);
        push_back_token_expression(&mut copied, &tokens, 6);
        assert_eq!(copied.last().map(|t| t.contents.as_str()), Some("c"));
    }
}
