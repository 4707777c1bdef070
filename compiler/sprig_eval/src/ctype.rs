//! Rendering Sprig type expressions to C type text.
//!
//! Type syntax: a bare symbol (`int`, `my-struct`), `(* type)` for pointers,
//! `(const type)`, and `([] type)` / `([] size type)` for arrays. Arrays
//! split their rendering: the element type goes before the variable name,
//! the brackets after it, which is why every caller gets two fragment
//! vectors.

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{Token, TokenKind};
use sprig_output::{add_string_output, OutputModifiers, StringOutput};

use crate::helpers::{find_close_paren_token_index, get_argument, get_num_arguments};

/// Render the type expression at `start` into `type_output` (before the
/// declared name) and `after_name_output` (array suffixes).
pub fn tokenized_c_type_to_string_recursive(
    tokens: &[Token],
    start: usize,
    allow_array: bool,
    type_output: &mut Vec<StringOutput>,
    after_name_output: &mut Vec<StringOutput>,
) -> bool {
    let token = &tokens[start];
    match token.kind {
        TokenKind::Symbol => {
            add_string_output(
                type_output,
                token.contents.clone(),
                OutputModifiers::CONVERT_TYPE_NAME,
                token,
            );
            true
        }
        TokenKind::OpenParen => {
            let end = find_close_paren_token_index(tokens, start);
            let head = &tokens[start + 1];
            if head.kind != TokenKind::Symbol {
                emit_blamed_error(head, "expected a type form head");
                return false;
            }
            match head.contents.as_str() {
                "*" => {
                    let Some(inner) = get_argument(tokens, start, 1, end) else {
                        emit_blamed_error(head, "(* type) requires a type");
                        return false;
                    };
                    if !tokenized_c_type_to_string_recursive(
                        tokens,
                        inner,
                        allow_array,
                        type_output,
                        after_name_output,
                    ) {
                        return false;
                    }
                    add_string_output(type_output, "*", OutputModifiers::NONE, head);
                    true
                }
                "const" => {
                    let Some(inner) = get_argument(tokens, start, 1, end) else {
                        emit_blamed_error(head, "(const type) requires a type");
                        return false;
                    };
                    add_string_output(
                        type_output,
                        "const",
                        OutputModifiers::SPACE_AFTER,
                        head,
                    );
                    tokenized_c_type_to_string_recursive(
                        tokens,
                        inner,
                        allow_array,
                        type_output,
                        after_name_output,
                    )
                }
                "[]" => {
                    if !allow_array {
                        emit_blamed_error(head, "array types are not allowed here");
                        return false;
                    }
                    // ([] type) or ([] size type); the size must be a bare
                    // symbol (a number or a named constant).
                    let arguments = get_num_arguments(tokens, start, end);
                    let (size, element) = match arguments {
                        2 => (None, get_argument(tokens, start, 1, end)),
                        3 => (
                            get_argument(tokens, start, 1, end),
                            get_argument(tokens, start, 2, end),
                        ),
                        _ => {
                            emit_blamed_error(head, "expected ([] type) or ([] size type)");
                            return false;
                        }
                    };
                    let Some(element) = element else {
                        emit_blamed_error(head, "array type requires an element type");
                        return false;
                    };
                    if !tokenized_c_type_to_string_recursive(
                        tokens,
                        element,
                        allow_array,
                        type_output,
                        after_name_output,
                    ) {
                        return false;
                    }
                    let size_text = match size {
                        Some(index) => {
                            let size_token = &tokens[index];
                            if size_token.kind != TokenKind::Symbol {
                                emit_blamed_error(size_token, "array size must be a symbol");
                                return false;
                            }
                            format!("[{}]", size_token.contents)
                        }
                        None => "[]".to_string(),
                    };
                    add_string_output(after_name_output, size_text, OutputModifiers::NONE, head);
                    true
                }
                other => {
                    emit_blamed_error(head, format!("unknown type form '{other}'"));
                    false
                }
            }
        }
        _ => {
            emit_blamed_error(
                token,
                format!("expected a type, got {}", token.kind.description()),
            );
            false
        }
    }
}
