//! Compile-time definition forms: `defmacro`, `defgenerator`,
//! `defun-comptime`, hook registration, and `tokenize-push`.
//!
//! These forms do not splice into the module's runtime output. They emit C
//! into a compile-time output cell; the resolver hands that text to the
//! build collaborator, loads the resulting library, and installs the symbol
//! in the right registry. The generated C manipulates the environment only
//! through the `sprig_*` interface functions.

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{Token, TokenKind, TokenRun};
use sprig_output::{
    add_lang_token_output, add_string_output, GeneratorOutput, OutputCell, OutputModifiers,
};

use crate::environment::{
    CompileTimeState, Environment, HookPhase, HookRequest, ObjectDefinition, ObjectType,
};
use crate::evaluator::{evaluate_generate_all_recursive, EvaluatorContext, EvaluatorScope};
use crate::helpers::{
    expect_evaluator_scope, expect_num_arguments, expect_token_type,
    find_close_paren_token_index, get_argument, get_expected_argument, get_next_argument,
    invocation_head,
};

use super::functions::parse_function_signature;

/// Escape text as the body of a C string literal in emitted prologue code.
fn escape_for_c_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Emit one raw line of C into a compile-time output.
fn add_comptime_line(output: &mut GeneratorOutput, line: impl Into<String>, blame: &Token) {
    add_string_output(
        &mut output.source,
        line,
        OutputModifiers::NEWLINE_AFTER,
        blame,
    );
}

/// Shared front half of the compile-time definition forms: scope and shape
/// checks, then definition registration with a Pending build state.
fn begin_comptime_definition(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    object_type: ObjectType,
) -> Option<(Token, usize, OutputCell)> {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    if !expect_evaluator_scope(&head.contents, head, context, EvaluatorScope::Module) {
        return None;
    }
    let name_index = get_expected_argument("definition name", tokens, start, 1, end)?;
    let name = tokens[name_index].clone();
    if !expect_token_type(&head.contents, &name, TokenKind::Symbol) {
        return None;
    }
    let args_index = get_expected_argument("argument list", tokens, start, 2, end)?;
    if !expect_token_type(&head.contents, &tokens[args_index], TokenKind::OpenParen) {
        return None;
    }

    let mut definition = ObjectDefinition::new(name.clone(), object_type, context.module.clone());
    definition.output = Some(OutputCell::new());
    definition.invocation = Some((tokens.clone(), start));
    definition.signature = Some((tokens.clone(), args_index));
    definition.compile_time_state = CompileTimeState::Pending;
    if !environment.add_object_definition(definition) {
        return None;
    }
    let cell = environment
        .find_definition(&name.contents)
        .and_then(|d| d.output.clone())?;
    Some((name, args_index, cell))
}

/// `defmacro`: a token→token rewriter written in Sprig.
///
/// The declared arguments destructure the invocation: each becomes an `int`
/// index into the invocation's tokens, bound in the generated prologue.
pub fn defmacro_generator(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    _output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let Some((name, args_index, cell)) =
        begin_comptime_definition(environment, context, tokens, start, ObjectType::Macro)
    else {
        return false;
    };

    let mut body_errors = 0;
    {
        let mut out = cell.borrow_mut();
        add_string_output(&mut out.source, "bool", OutputModifiers::SPACE_AFTER, &name);
        add_string_output(
            &mut out.source,
            name.contents.clone(),
            OutputModifiers::CONVERT_FUNCTION_NAME,
            &name,
        );
        add_comptime_line(
            &mut out,
            "(void* environment, const void* context, const void* tokens, int startTokenIndex, void* output)",
            &name,
        );
        add_lang_token_output(&mut out.source, OutputModifiers::OPEN_BLOCK, &name);

        // Destructuring prologue: bind each declared argument to its index.
        let args_end = find_close_paren_token_index(tokens, args_index);
        let mut argument = args_index + 1;
        let mut position = 1;
        while argument < args_end {
            let argument_token = &tokens[argument];
            if !expect_token_type("defmacro argument", argument_token, TokenKind::Symbol) {
                return false;
            }
            let binding = &argument_token.contents;
            add_comptime_line(
                &mut out,
                format!(
                    "int {binding} = sprig_get_argument(tokens, startTokenIndex, {position});"
                ),
                argument_token,
            );
            add_comptime_line(
                &mut out,
                format!(
                    "if ({binding} < 0) {{ sprig_error(sprig_token_at(tokens, startTokenIndex), \"{}\"); return false; }}",
                    escape_for_c_literal(&format!(
                        "macro '{}' expected argument '{binding}'",
                        name.contents
                    ))
                ),
                argument_token,
            );
            argument = get_next_argument(tokens, argument, args_end);
            position += 1;
        }

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
        add_lang_token_output(&mut out.source, OutputModifiers::CLOSE_BLOCK, &name);
    }
    body_errors == 0
}

/// `defgenerator` / `defun-comptime`: compile-time procedures with
/// name/type signatures. Parameters are emitted as opaque pointers; bodies
/// reach the environment through the interface functions.
pub fn defgenerator_generator(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    _output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    let object_type = if head.contents == "defgenerator" {
        ObjectType::Generator
    } else {
        ObjectType::CompileTimeFunction
    };
    let Some((name, args_index, cell)) =
        begin_comptime_definition(environment, context, tokens, start, object_type)
    else {
        return false;
    };

    let Some((arguments, _return_type)) = parse_function_signature(tokens, args_index) else {
        return false;
    };

    let mut body_errors = 0;
    {
        let mut out = cell.borrow_mut();
        add_string_output(&mut out.source, "bool", OutputModifiers::SPACE_AFTER, &name);
        add_string_output(
            &mut out.source,
            name.contents.clone(),
            OutputModifiers::CONVERT_FUNCTION_NAME,
            &name,
        );
        if object_type == ObjectType::Generator {
            add_comptime_line(
                &mut out,
                "(void* environment, const void* context, const void* tokens, int startTokenIndex, void* output)",
                &name,
            );
        } else {
            let mut parameters = String::from("(");
            for (position, argument) in arguments.iter().enumerate() {
                if position > 0 {
                    parameters.push_str(", ");
                }
                parameters.push_str("void* ");
                parameters.push_str(&tokens[argument.name_index].contents);
            }
            parameters.push(')');
            add_comptime_line(&mut out, parameters, &name);
        }
        add_lang_token_output(&mut out.source, OutputModifiers::OPEN_BLOCK, &name);

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
        add_lang_token_output(&mut out.source, OutputModifiers::CLOSE_BLOCK, &name);
    }
    body_errors == 0
}

/// `(add-compile-time-hook phase function-name)`.
///
/// The phase must be one of the stable names; anything else is rejected so
/// typos do not silently never fire. The function may be defined later in
/// any module — registration demands it by name and the resolver builds it.
pub fn add_compile_time_hook_generator(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    _output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    if !expect_evaluator_scope("add-compile-time-hook", head, context, EvaluatorScope::Module) {
        return false;
    }
    if !expect_num_arguments(tokens, start, end, 3) {
        return false;
    }
    let Some(phase_index) = get_expected_argument("hook phase", tokens, start, 1, end) else {
        return false;
    };
    let phase_token = &tokens[phase_index];
    if !expect_token_type("add-compile-time-hook", phase_token, TokenKind::Symbol) {
        return false;
    }
    let Some(phase) = HookPhase::from_name(&phase_token.contents) else {
        emit_blamed_error(
            phase_token,
            format!(
                "unknown hook phase '{}'; known phases are post-references-resolved and pre-link",
                phase_token.contents
            ),
        );
        return false;
    };
    let Some(function_index) = get_expected_argument("hook function", tokens, start, 2, end)
    else {
        return false;
    };
    let function_token = &tokens[function_index];
    if !expect_token_type("add-compile-time-hook", function_token, TokenKind::Symbol) {
        return false;
    }

    let function_name = function_token.contents.clone();
    if let Some(definition) = environment.find_definition_mut(&function_name) {
        definition.expected_signature = Some(phase.expected_signature());
    }
    environment.require_comptime_function(function_name.clone(), function_token);
    environment.hooks.push(HookRequest {
        phase,
        function_name,
        blame: function_token.clone(),
    });
    true
}

/// `(tokenize-push buffer forms...)`: emit C that synthesizes the given
/// forms into a macro's expansion buffer at compile-run time. `(tok-splice
/// binding)` splices the token expression a macro argument is bound to.
pub fn tokenize_push_generator(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let _ = environment;
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    if !expect_evaluator_scope("tokenize-push", head, context, EvaluatorScope::Body) {
        return false;
    }
    let Some(buffer_index) = get_expected_argument("output buffer", tokens, start, 1, end) else {
        return false;
    };
    let buffer_token = &tokens[buffer_index];
    if !expect_token_type("tokenize-push", buffer_token, TokenKind::Symbol) {
        return false;
    }
    let buffer = buffer_token.contents.clone();

    // Block scope so nested tokenize-push forms can rebind the blame local.
    add_lang_token_output(&mut output.source, OutputModifiers::OPEN_BLOCK, head);
    add_comptime_line(
        output,
        "const void* tokenizePushBlame = sprig_token_at(tokens, startTokenIndex);",
        head,
    );

    let mut form = get_next_argument(tokens, buffer_index, end);
    let mut succeeded = true;
    while form < end {
        succeeded &= emit_tokenize_form(tokens, form, &buffer, output);
        form = get_next_argument(tokens, form, end);
    }

    add_lang_token_output(&mut output.source, OutputModifiers::CLOSE_BLOCK, head);
    succeeded
}

fn emit_tokenize_form(
    tokens: &TokenRun,
    index: usize,
    buffer: &str,
    output: &mut GeneratorOutput,
) -> bool {
    let token = &tokens[index];
    match token.kind {
        TokenKind::OpenParen => {
            let end = find_close_paren_token_index(tokens, index);
            let head = &tokens[index + 1];
            if head.kind == TokenKind::Symbol && head.contents == "tok-splice" {
                let Some(binding_index) = get_argument(tokens, index, 1, end) else {
                    emit_blamed_error(head, "tok-splice requires a macro argument binding");
                    return false;
                };
                let binding = &tokens[binding_index];
                if !expect_token_type("tok-splice", binding, TokenKind::Symbol) {
                    return false;
                }
                add_comptime_line(
                    output,
                    format!(
                        "sprig_tokens_push_expression({buffer}, tokens, {});",
                        binding.contents
                    ),
                    head,
                );
                return true;
            }

            add_comptime_line(
                output,
                format!("sprig_tokens_push_open({buffer}, tokenizePushBlame);"),
                token,
            );
            let mut child = index + 1;
            let mut succeeded = true;
            while child < end {
                succeeded &= emit_tokenize_form(tokens, child, buffer, output);
                child = get_next_argument(tokens, child, end);
            }
            add_comptime_line(
                output,
                format!("sprig_tokens_push_close({buffer}, tokenizePushBlame);"),
                token,
            );
            succeeded
        }
        TokenKind::Symbol => {
            add_comptime_line(
                output,
                format!(
                    "sprig_tokens_push_symbol({buffer}, \"{}\", tokenizePushBlame);",
                    escape_for_c_literal(&token.contents)
                ),
                token,
            );
            true
        }
        TokenKind::String => {
            add_comptime_line(
                output,
                format!(
                    "sprig_tokens_push_string({buffer}, \"{}\", tokenizePushBlame);",
                    escape_for_c_literal(&token.contents)
                ),
                token,
            );
            true
        }
        TokenKind::CloseParen => false,
    }
}

/// `(comptime-error "message")`: fail evaluation with a user-chosen message.
/// Mostly useful for guarding unfinished code paths and testing error
/// recovery.
pub fn comptime_error_generator(
    _environment: &mut Environment,
    _context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    _output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    let message = get_argument(tokens, start, 1, end)
        .map(|index| tokens[index].contents.clone())
        .unwrap_or_else(|| "comptime-error".to_string());
    emit_blamed_error(head, message);
    false
}
