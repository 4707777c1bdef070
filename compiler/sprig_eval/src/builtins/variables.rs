//! `var`: variable declarations at module and body scope.
//!
//! `(var name type)` or `(var name type initializer)`. At module scope the
//! variable becomes an [`ObjectDefinition`] so post-resolution hooks can
//! rewrite it; at body scope it is a plain local declaration. Illegal in
//! expression position.

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{TokenKind, TokenRun};
use sprig_output::{
    add_lang_token_output, add_splice_output, add_string_output, GeneratorOutput, OutputCell,
    OutputModifiers,
};

use crate::ctype::tokenized_c_type_to_string_recursive;
use crate::environment::{Environment, ObjectDefinition, ObjectType};
use crate::evaluator::{evaluate_generate_recursive, EvaluatorContext, EvaluatorScope};
use crate::helpers::{
    expect_token_type, find_close_paren_token_index, get_argument, get_expected_argument,
    get_num_arguments, invocation_head, is_forbidden_evaluator_scope,
};

/// Emit `type name [= initializer];` into `output.source`.
fn output_variable_declaration(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    name_index: usize,
    type_index: usize,
    initializer_index: Option<usize>,
    output: &mut GeneratorOutput,
) -> bool {
    let name = &tokens[name_index];

    let mut type_output = Vec::new();
    let mut after_name_output = Vec::new();
    if !tokenized_c_type_to_string_recursive(
        tokens,
        type_index,
        /*allow_array=*/ true,
        &mut type_output,
        &mut after_name_output,
    ) {
        return false;
    }
    output.source.append(&mut type_output);
    add_string_output(
        &mut output.source,
        name.contents.clone(),
        OutputModifiers::CONVERT_VARIABLE_NAME | OutputModifiers::SPACE_BEFORE,
        name,
    );
    output.source.append(&mut after_name_output);

    if let Some(initializer) = initializer_index {
        add_string_output(
            &mut output.source,
            "=",
            OutputModifiers::SPACE_BEFORE | OutputModifiers::SPACE_AFTER,
            &tokens[initializer],
        );
        let child = context.expression_child();
        if evaluate_generate_recursive(environment, &child, tokens, initializer, output) > 0 {
            return false;
        }
    }
    add_lang_token_output(&mut output.source, OutputModifiers::END_STATEMENT, &tokens[start]);
    true
}

/// `var` generator.
pub fn var_generator(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    if is_forbidden_evaluator_scope("var", head, context, EvaluatorScope::ExpressionsOnly) {
        return false;
    }

    let arguments = get_num_arguments(tokens, start, end);
    if !(3..=4).contains(&arguments) {
        emit_blamed_error(head, "expected (var name type) or (var name type initializer)");
        return false;
    }
    let Some(name_index) = get_expected_argument("variable name", tokens, start, 1, end) else {
        return false;
    };
    if !expect_token_type("var", &tokens[name_index], TokenKind::Symbol) {
        return false;
    }
    let Some(type_index) = get_expected_argument("variable type", tokens, start, 2, end) else {
        return false;
    };
    let initializer_index = get_argument(tokens, start, 3, end);

    if context.scope == EvaluatorScope::Body {
        return output_variable_declaration(
            environment,
            context,
            tokens,
            start,
            name_index,
            type_index,
            initializer_index,
            output,
        );
    }

    // Module scope: a rewritable definition.
    let name = tokens[name_index].clone();
    let mut definition =
        ObjectDefinition::new(name.clone(), ObjectType::Variable, context.module.clone());
    definition.output = Some(OutputCell::new());
    definition.is_required = context.is_required;
    definition.invocation = Some((tokens.clone(), start));
    if !environment.add_object_definition(definition) {
        return false;
    }
    let Some(cell) = environment
        .find_definition(&name.contents)
        .and_then(|d| d.output.clone())
    else {
        return false;
    };

    let declaration_context = EvaluatorContext {
        definition_name: Some(name),
        ..context.clone()
    };
    let succeeded = {
        let mut out = cell.borrow_mut();
        output_variable_declaration(
            environment,
            &declaration_context,
            tokens,
            start,
            name_index,
            type_index,
            initializer_index,
            &mut out,
        )
    };
    add_splice_output(output, &cell, head);
    succeeded
}
