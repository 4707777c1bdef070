//! `defun` and `defun-local`, plus the signature machinery shared with the
//! compile-time definition forms.
//!
//! Signature syntax: `(defun name (arg type arg type &return type) body...)`.
//! The return type is optional; omitting it emits `void`.

use smallvec::SmallVec;

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{Token, TokenKind, TokenRun};
use sprig_output::{
    add_lang_token_output, add_splice_output, add_string_output, GeneratorOutput, OutputCell,
    OutputModifiers, StringOutput,
};

use crate::ctype::tokenized_c_type_to_string_recursive;
use crate::environment::{Environment, ObjectDefinition, ObjectType};
use crate::evaluator::{evaluate_generate_all_recursive, EvaluatorContext, EvaluatorScope};
use crate::helpers::{
    expect_evaluator_scope, expect_token_type, find_close_paren_token_index, get_argument,
    get_expected_argument, get_next_argument, invocation_head, is_special_symbol,
};

/// One parsed `name type` pair of a function signature.
#[derive(Clone, Copy, Debug)]
pub struct FunctionArgumentTokens {
    pub name_index: usize,
    pub type_start: usize,
}

pub type FunctionArguments = SmallVec<[FunctionArgumentTokens; 8]>;

/// Parse an argument list opening at `args_index`. Returns the arguments and
/// the return type's start index, if declared via `&return`.
pub fn parse_function_signature(
    tokens: &[Token],
    args_index: usize,
) -> Option<(FunctionArguments, Option<usize>)> {
    let end = find_close_paren_token_index(tokens, args_index);
    let mut arguments = FunctionArguments::new();
    let mut return_type_start = None;

    let mut index = args_index + 1;
    while index < end {
        let token = &tokens[index];
        if token.kind == TokenKind::Symbol && token.contents == "&return" {
            let type_index = get_next_argument(tokens, index, end);
            if type_index >= end {
                emit_blamed_error(token, "&return requires a type");
                return None;
            }
            return_type_start = Some(type_index);
            index = get_next_argument(tokens, type_index, end);
            if index < end {
                emit_blamed_error(&tokens[index], "&return must be the last signature entry");
                return None;
            }
            break;
        }

        if !expect_token_type("argument name", token, TokenKind::Symbol) {
            return None;
        }
        if is_special_symbol(token) {
            emit_blamed_error(token, "argument names cannot be special symbols");
            return None;
        }
        let type_start = get_next_argument(tokens, index, end);
        if type_start >= end {
            emit_blamed_error(token, format!("argument '{}' requires a type", token.contents));
            return None;
        }
        arguments.push(FunctionArgumentTokens {
            name_index: index,
            type_start,
        });
        index = get_next_argument(tokens, type_start, end);
    }

    Some((arguments, return_type_start))
}

fn push_to_streams(
    output: &mut GeneratorOutput,
    fragments: &[StringOutput],
    to_header: bool,
) {
    for fragment in fragments {
        output.source.push(fragment.clone());
        if to_header {
            output.header.push(fragment.clone());
        }
    }
}

/// Emit a function's return type to the source (and optionally header)
/// stream. Blamed to `invocation_blame` when the type is implicit `void`.
pub fn output_function_return_type(
    tokens: &[Token],
    output: &mut GeneratorOutput,
    return_type_start: Option<usize>,
    invocation_blame: &Token,
    to_header: bool,
) -> bool {
    let mut type_output = Vec::new();
    let mut after_name_output = Vec::new();
    match return_type_start {
        Some(index) => {
            if !tokenized_c_type_to_string_recursive(
                tokens,
                index,
                /*allow_array=*/ false,
                &mut type_output,
                &mut after_name_output,
            ) {
                return false;
            }
            if !after_name_output.is_empty() {
                emit_blamed_error(&tokens[index], "functions cannot return array types");
                return false;
            }
        }
        None => add_string_output(
            &mut type_output,
            "void",
            OutputModifiers::NONE,
            invocation_blame,
        ),
    }
    push_to_streams(output, &type_output, to_header);
    true
}

/// Emit a function's argument list (between the parens) to the source (and
/// optionally header) stream.
pub fn output_function_arguments(
    tokens: &[Token],
    output: &mut GeneratorOutput,
    arguments: &[FunctionArgumentTokens],
    to_header: bool,
) -> bool {
    let mut fragments = Vec::new();
    for (position, argument) in arguments.iter().enumerate() {
        if position > 0 {
            fragments.push(StringOutput::delimiter_template(
                OutputModifiers::LIST_SEPARATOR,
                &tokens[argument.name_index],
            ));
        }
        let mut after_name_output = Vec::new();
        if !tokenized_c_type_to_string_recursive(
            tokens,
            argument.type_start,
            /*allow_array=*/ true,
            &mut fragments,
            &mut after_name_output,
        ) {
            return false;
        }
        let name = &tokens[argument.name_index];
        add_string_output(
            &mut fragments,
            name.contents.clone(),
            OutputModifiers::CONVERT_VARIABLE_NAME | OutputModifiers::SPACE_BEFORE,
            name,
        );
        fragments.append(&mut after_name_output);
    }
    push_to_streams(output, &fragments, to_header);
    true
}

/// `defun` / `defun-local`: define a C function. `defun-local` is `static`
/// and gets no header prototype.
pub fn defun_generator(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    let local = head.contents == "defun-local";
    if !expect_evaluator_scope(&head.contents, head, context, EvaluatorScope::Module) {
        return false;
    }

    let Some(name_index) = get_expected_argument("function name", tokens, start, 1, end) else {
        return false;
    };
    let name = &tokens[name_index];
    if !expect_token_type(&head.contents, name, TokenKind::Symbol) {
        return false;
    }
    let Some(args_index) = get_expected_argument("argument list", tokens, start, 2, end) else {
        return false;
    };
    if !expect_token_type(&head.contents, &tokens[args_index], TokenKind::OpenParen) {
        return false;
    }
    let Some((arguments, return_type_start)) = parse_function_signature(tokens, args_index) else {
        return false;
    };

    // Register before evaluating the body so references made by the body
    // blame this definition.
    let mut definition =
        ObjectDefinition::new(name.clone(), ObjectType::Function, context.module.clone());
    definition.output = Some(OutputCell::new());
    definition.is_required = context.is_required;
    definition.invocation = Some((tokens.clone(), start));
    definition.signature = Some((tokens.clone(), args_index));
    if !environment.add_object_definition(definition) {
        return false;
    }
    let Some(cell) = environment
        .find_definition(&name.contents)
        .and_then(|d| d.output.clone())
    else {
        return false;
    };

    let to_header = !local;
    let mut body_errors = 0;
    {
        let mut out = cell.borrow_mut();
        if local {
            add_string_output(
                &mut out.source,
                "static",
                OutputModifiers::SPACE_AFTER,
                head,
            );
        }
        if !output_function_return_type(tokens, &mut out, return_type_start, head, to_header) {
            return false;
        }
        add_string_output(
            &mut out.source,
            name.contents.clone(),
            OutputModifiers::CONVERT_FUNCTION_NAME | OutputModifiers::SPACE_BEFORE,
            name,
        );
        if to_header {
            add_string_output(
                &mut out.header,
                name.contents.clone(),
                OutputModifiers::CONVERT_FUNCTION_NAME | OutputModifiers::SPACE_BEFORE,
                name,
            );
        }
        add_lang_token_output(&mut out.source, OutputModifiers::OPEN_PAREN, name);
        if to_header {
            add_lang_token_output(&mut out.header, OutputModifiers::OPEN_PAREN, name);
        }
        if !output_function_arguments(tokens, &mut out, &arguments, to_header) {
            return false;
        }
        add_lang_token_output(&mut out.source, OutputModifiers::CLOSE_PAREN, name);
        if to_header {
            add_lang_token_output(
                &mut out.header,
                OutputModifiers::CLOSE_PAREN | OutputModifiers::END_STATEMENT,
                name,
            );
        }
        add_lang_token_output(&mut out.source, OutputModifiers::OPEN_BLOCK, head);

        if let Some(body_start) = get_argument(tokens, start, 3, end) {
            let body_context = EvaluatorContext {
                scope: EvaluatorScope::Body,
                module: context.module.clone(),
                definition_name: Some(name.clone()),
                is_required: context.is_required,
                delimiter_template: None,
            };
            body_errors =
                evaluate_generate_all_recursive(environment, &body_context, tokens, body_start, &mut out);
        }

        add_lang_token_output(&mut out.source, OutputModifiers::CLOSE_BLOCK, head);
    }

    add_splice_output(output, &cell, head);
    body_errors == 0
}
