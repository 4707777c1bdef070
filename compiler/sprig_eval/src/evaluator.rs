//! The central evaluator: a token-stream driven, recursive code generator.
//!
//! [`evaluate_generate_recursive`] consumes a (run, start, context, output)
//! tuple and returns an error count. Dispatch order at an invocation: known
//! generator, known macro, then unknown symbol — which is *not* an error:
//! the evaluator emits a provisional C function call into a dedicated splice
//! and records a [`Reference`], letting the resolver rewrite the splice if
//! the name later turns out to be a macro or generator defined elsewhere.
//!
//! Errors are blamed diagnostics plus a count; evaluation continues with the
//! next sibling so one pass reports as many errors as possible.

use std::sync::Arc;

use tracing::trace;

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{validate_parentheses, Token, TokenKind, TokenRun};
use sprig_output::{
    add_lang_token_output, add_splice_output, add_string_output, GeneratorOutput, OutputCell,
    OutputModifiers, StringOutput,
};

use crate::environment::{Environment, Reference};
use crate::helpers::{find_close_paren_token_index, get_next_argument, is_special_symbol};
use crate::runtime::{invoke_generator, invoke_macro};

/// Which kinds of forms are legal at the current position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluatorScope {
    /// Top level of a module: definitions and module directives.
    Module,
    /// Statement position inside a function body.
    Body,
    /// Expression position: atoms and value-producing invocations only.
    ExpressionsOnly,
    /// No scope at all; used for delimiter templates and synthetic contexts.
    None,
}

impl EvaluatorScope {
    pub fn description(self) -> &'static str {
        match self {
            EvaluatorScope::Module => "module",
            EvaluatorScope::Body => "body",
            EvaluatorScope::ExpressionsOnly => "expressions-only",
            EvaluatorScope::None => "no",
        }
    }
}

/// Ephemeral per-invocation record threading scope, module, the definition
/// being contributed to, and the required flag through evaluation.
#[derive(Clone, Debug)]
pub struct EvaluatorContext {
    pub scope: EvaluatorScope,
    /// Filename of the owning module, when evaluating module code.
    pub module: Option<Arc<str>>,
    /// The definition this code contributes to; references blame it and
    /// macro expansions are recorded on it.
    pub definition_name: Option<Token>,
    /// Whether the surrounding definition is required for linking.
    /// Propagates into every reference this evaluation records.
    pub is_required: bool,
    /// Placed after each sibling statement (e.g. a newline).
    pub delimiter_template: Option<StringOutput>,
}

impl EvaluatorContext {
    /// A derived context for evaluating one argument in expression position.
    pub fn expression_child(&self) -> EvaluatorContext {
        EvaluatorContext {
            scope: EvaluatorScope::ExpressionsOnly,
            module: self.module.clone(),
            definition_name: self.definition_name.clone(),
            is_required: self.is_required,
            delimiter_template: None,
        }
    }

    /// A derived context for evaluating statements inside a block.
    pub fn body_child(&self, delimiter: Option<StringOutput>) -> EvaluatorContext {
        EvaluatorContext {
            scope: EvaluatorScope::Body,
            module: self.module.clone(),
            definition_name: self.definition_name.clone(),
            is_required: self.is_required,
            delimiter_template: delimiter,
        }
    }
}

/// Evaluate the single form at `start`, producing output and an error count.
pub fn evaluate_generate_recursive(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> u32 {
    let token = &tokens[start];
    match token.kind {
        TokenKind::OpenParen => evaluate_invocation(environment, context, tokens, start, output),
        TokenKind::Symbol => {
            let name = token.contents.as_str();
            // A bare symbol naming a generator or macro is an invocation
            // without arguments.
            if environment.generators.contains_key(name)
                || environment.macros.contains_key(name)
            {
                return evaluate_invocation(environment, context, tokens, start, output);
            }
            if context.scope == EvaluatorScope::ExpressionsOnly
                || environment.definitions.contains_key(name)
            {
                evaluate_atom(context, token, output);
                return 0;
            }
            emit_blamed_error(
                token,
                format!("unknown symbol '{name}' in {} scope", context.scope.description()),
            );
            1
        }
        TokenKind::String => {
            if context.scope != EvaluatorScope::ExpressionsOnly {
                emit_blamed_error(token, "strings are only valid in expression position");
                return 1;
            }
            evaluate_atom(context, token, output);
            0
        }
        TokenKind::CloseParen => {
            // Callers iterate with get_next_argument and never land here on
            // a validated run.
            emit_blamed_error(token, "unexpected close parenthesis");
            1
        }
    }
}

/// Evaluate sibling forms from `start` until the run (or enclosing paren)
/// ends, placing `context.delimiter_template` after each statement.
pub fn evaluate_generate_all_recursive(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> u32 {
    let mut errors = 0;
    let mut index = start;
    while index < tokens.len() {
        if tokens[index].kind == TokenKind::CloseParen {
            break;
        }
        errors += evaluate_generate_recursive(environment, context, tokens, index, output);
        if let Some(template) = &context.delimiter_template {
            output.source.push(template.with_blame(&tokens[index]));
        }
        index = get_next_argument(tokens, index, tokens.len());
    }
    errors
}

/// Emit an atom in expression position.
fn evaluate_atom(_context: &EvaluatorContext, token: &Token, output: &mut GeneratorOutput) {
    match token.kind {
        TokenKind::String => add_string_output(
            &mut output.source,
            token.contents.clone(),
            OutputModifiers::SURROUND_WITH_QUOTES,
            token,
        ),
        _ if is_special_symbol(token) => add_string_output(
            &mut output.source,
            token.contents.clone(),
            OutputModifiers::NONE,
            token,
        ),
        _ => add_string_output(
            &mut output.source,
            token.contents.clone(),
            OutputModifiers::CONVERT_VARIABLE_NAME,
            token,
        ),
    }
}

/// Dispatch an invocation: generator, macro, or unknown symbol.
///
/// `start` is the open paren, or the symbol itself for bare invocations.
fn evaluate_invocation(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> u32 {
    let is_call = tokens[start].kind == TokenKind::OpenParen;
    let head_index = if is_call { start + 1 } else { start };
    if head_index >= tokens.len() {
        emit_blamed_error(&tokens[start], "expected invocation name");
        return 1;
    }
    let head = &tokens[head_index];
    if head.kind != TokenKind::Symbol {
        emit_blamed_error(
            head,
            format!("invocation name must be a symbol, got {}", head.kind.description()),
        );
        return 1;
    }
    let name = head.contents.clone();

    if let Some(generator) = environment.generators.get(&name).copied() {
        trace!(name = %name, "invoking generator");
        if !invoke_generator(generator, environment, context, tokens, start, output) {
            return 1;
        }
        return 0;
    }

    if let Some(procedure) = environment.macros.get(&name).copied() {
        trace!(name = %name, "expanding macro");
        let mut expansion_tokens: Vec<Token> = Vec::new();
        if !invoke_macro(procedure, environment, context, tokens, start, &mut expansion_tokens) {
            emit_blamed_error(head, format!("macro '{name}' failed"));
            return 1;
        }
        if let Err(error) = validate_parentheses(&expansion_tokens) {
            emit_blamed_error(
                error.blame(),
                format!("macro '{name}' produced an unbalanced expansion: {error}"),
            );
            return 1;
        }
        let expansion = environment.add_comptime_run(expansion_tokens);
        environment.record_macro_expansion(context, tokens.clone(), start, expansion.clone());
        // The expansion is evaluated under the *same* context, in place of
        // the invocation.
        return evaluate_generate_all_expansion(environment, context, &expansion, output);
    }

    evaluate_unknown_invocation(environment, context, tokens, start, head_index, output)
}

/// Evaluate a macro expansion. A single expression expands in place; a
/// sequence of statements expands as siblings.
fn evaluate_generate_all_expansion(
    environment: &mut Environment,
    context: &EvaluatorContext,
    expansion: &TokenRun,
    output: &mut GeneratorOutput,
) -> u32 {
    if context.scope == EvaluatorScope::ExpressionsOnly {
        if expansion.is_empty() {
            return 0;
        }
        return evaluate_generate_recursive(environment, context, expansion, 0, output);
    }
    evaluate_generate_all_recursive(environment, context, expansion, 0, output)
}

/// Unknown head: emit a provisional C function call into a dedicated splice
/// and record a reference for the resolver.
fn evaluate_unknown_invocation(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    head_index: usize,
    output: &mut GeneratorOutput,
) -> u32 {
    let head = &tokens[head_index];
    let mut errors = 0;
    let cell = OutputCell::new();
    {
        let mut guess = cell.borrow_mut();
        add_string_output(
            &mut guess.source,
            head.contents.clone(),
            OutputModifiers::CONVERT_FUNCTION_NAME,
            head,
        );
        add_lang_token_output(&mut guess.source, OutputModifiers::OPEN_PAREN, head);

        let argument_context = context.expression_child();
        if tokens[start].kind == TokenKind::OpenParen {
            let end = find_close_paren_token_index(tokens, start);
            let mut argument = head_index + 1;
            let mut first = true;
            while argument < end {
                if !first {
                    add_lang_token_output(
                        &mut guess.source,
                        OutputModifiers::LIST_SEPARATOR,
                        &tokens[argument],
                    );
                }
                first = false;
                errors += evaluate_generate_recursive(
                    environment,
                    &argument_context,
                    tokens,
                    argument,
                    &mut guess,
                );
                argument = get_next_argument(tokens, argument, end);
            }
        }

        add_lang_token_output(&mut guess.source, OutputModifiers::CLOSE_PAREN, head);
        if context.scope != EvaluatorScope::ExpressionsOnly {
            add_lang_token_output(&mut guess.source, OutputModifiers::END_STATEMENT, head);
        }
    }
    add_splice_output(output, &cell, head);

    environment.add_reference(Reference {
        definition_name: context
            .definition_name
            .as_ref()
            .map(|token| token.contents.clone()),
        token: head.clone(),
        tokens: tokens.clone(),
        start,
        context: context.clone(),
        splice: cell,
        is_required: context.is_required,
    });
    errors
}
