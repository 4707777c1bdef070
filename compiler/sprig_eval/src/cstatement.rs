//! Declarative mini-language for building statement generators.
//!
//! Most built-in statement and operator generators are a table of
//! [`CStatementOperation`] records instead of hand-written emission code:
//! each record names an operation kind, a literal keyword, and an argument
//! index into the source form (0 = head, 1 = first argument).
//! [`c_statement_output`] interprets the table, recursing into the evaluator
//! for expression and body slots.

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::TokenRun;
use sprig_output::{
    add_lang_token_output, add_string_output, GeneratorOutput, OutputModifiers,
};

use crate::ctype::tokenized_c_type_to_string_recursive;
use crate::environment::Environment;
use crate::evaluator::{
    evaluate_generate_all_recursive, evaluate_generate_recursive, EvaluatorContext,
    EvaluatorScope,
};
use crate::helpers::{
    find_close_paren_token_index, get_argument, get_expected_argument, get_next_argument,
    invocation_head,
};

/// One step of a declarative statement description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CStatementOperationKind {
    /// Literal keyword with spaces around it.
    Keyword,
    /// Literal text with no implied spacing.
    KeywordNoSpace,
    /// `;` — omitted in expression position so operators nest.
    SmartEndStatement,
    OpenParen,
    CloseParen,
    OpenBlock,
    CloseBlock,
    /// Close the current block and open another around the keyword
    /// (`} else {`).
    ContinueBlock,
    /// Evaluate the argument at `argument_index` in expression position.
    Expression,
    /// Like `Expression`, but a missing argument is fine (`return;`).
    ExpressionOptional,
    /// Evaluate arguments from `argument_index` onward, comma separated.
    ExpressionList,
    /// Evaluate arguments from `argument_index` onward as statements.
    Body,
    /// Render the argument as a C type; array types are rejected.
    TypeNoArray,
}

/// A single operation of a statement description table.
#[derive(Clone, Copy, Debug)]
pub struct CStatementOperation {
    pub operation: CStatementOperationKind,
    pub keyword_or_symbol: &'static str,
    /// 0 = operation name, 1 = first argument. Unused by keyword/punctuation
    /// operations (conventionally -1).
    pub argument_index: i32,
}

/// Interpret a statement description table for the invocation at `start`.
pub fn c_statement_output(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    operations: &[CStatementOperation],
    output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let blame = invocation_head(tokens, start);
    let mut succeeded = true;

    for operation in operations {
        match operation.operation {
            CStatementOperationKind::Keyword => add_string_output(
                &mut output.source,
                operation.keyword_or_symbol,
                OutputModifiers::SPACE_BEFORE | OutputModifiers::SPACE_AFTER,
                blame,
            ),
            CStatementOperationKind::KeywordNoSpace => add_string_output(
                &mut output.source,
                operation.keyword_or_symbol,
                OutputModifiers::NONE,
                blame,
            ),
            CStatementOperationKind::SmartEndStatement => {
                if context.scope != EvaluatorScope::ExpressionsOnly {
                    add_lang_token_output(&mut output.source, OutputModifiers::END_STATEMENT, blame);
                }
            }
            CStatementOperationKind::OpenParen => {
                add_lang_token_output(&mut output.source, OutputModifiers::OPEN_PAREN, blame);
            }
            CStatementOperationKind::CloseParen => {
                add_lang_token_output(&mut output.source, OutputModifiers::CLOSE_PAREN, blame);
            }
            CStatementOperationKind::OpenBlock => {
                add_lang_token_output(&mut output.source, OutputModifiers::OPEN_BLOCK, blame);
            }
            CStatementOperationKind::CloseBlock => {
                add_lang_token_output(&mut output.source, OutputModifiers::CLOSE_BLOCK, blame);
            }
            CStatementOperationKind::ContinueBlock => add_string_output(
                &mut output.source,
                operation.keyword_or_symbol,
                OutputModifiers::CLOSE_BLOCK | OutputModifiers::OPEN_BLOCK,
                blame,
            ),
            CStatementOperationKind::Expression => {
                let Some(index) = get_expected_argument(
                    operation.keyword_or_symbol,
                    tokens,
                    start,
                    operation.argument_index as usize,
                    end,
                ) else {
                    succeeded = false;
                    continue;
                };
                let child = context.expression_child();
                if evaluate_generate_recursive(environment, &child, tokens, index, output) > 0 {
                    succeeded = false;
                }
            }
            CStatementOperationKind::ExpressionOptional => {
                if let Some(index) =
                    get_argument(tokens, start, operation.argument_index as usize, end)
                {
                    let child = context.expression_child();
                    if evaluate_generate_recursive(environment, &child, tokens, index, output) > 0 {
                        succeeded = false;
                    }
                }
            }
            CStatementOperationKind::ExpressionList => {
                let child = context.expression_child();
                let mut argument =
                    get_argument(tokens, start, operation.argument_index as usize, end);
                let mut first = true;
                while let Some(index) = argument {
                    if !first {
                        add_lang_token_output(
                            &mut output.source,
                            OutputModifiers::LIST_SEPARATOR,
                            &tokens[index],
                        );
                    }
                    first = false;
                    if evaluate_generate_recursive(environment, &child, tokens, index, output) > 0 {
                        succeeded = false;
                    }
                    let next = get_next_argument(tokens, index, end);
                    argument = (next < end).then_some(next);
                }
            }
            CStatementOperationKind::Body => {
                let Some(index) =
                    get_argument(tokens, start, operation.argument_index as usize, end)
                else {
                    // An empty body is legal (e.g. `(while (condition))`).
                    continue;
                };
                let child = context.body_child(None);
                if evaluate_generate_all_recursive(environment, &child, tokens, index, output) > 0 {
                    succeeded = false;
                }
            }
            CStatementOperationKind::TypeNoArray => {
                let Some(index) = get_expected_argument(
                    "type",
                    tokens,
                    start,
                    operation.argument_index as usize,
                    end,
                ) else {
                    succeeded = false;
                    continue;
                };
                let mut type_output = Vec::new();
                let mut after_name_output = Vec::new();
                if !tokenized_c_type_to_string_recursive(
                    tokens,
                    index,
                    /*allow_array=*/ false,
                    &mut type_output,
                    &mut after_name_output,
                ) {
                    succeeded = false;
                    continue;
                }
                if !after_name_output.is_empty() {
                    emit_blamed_error(&tokens[index], "array types are not allowed here");
                    succeeded = false;
                    continue;
                }
                output.source.append(&mut type_output);
            }
        }
    }
    succeeded
}
