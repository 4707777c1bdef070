//! Statement and operator generators, declared as C-statement tables.
//!
//! One dispatch function serves every table entry; the table is keyed by the
//! invocation head. `if` is the only control-flow form complex enough to be
//! hand-written.

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::TokenRun;
use sprig_output::{add_lang_token_output, add_string_output, GeneratorOutput, OutputModifiers};

use crate::cstatement::{
    c_statement_output, CStatementOperation,
    CStatementOperationKind::{
        Body, CloseBlock, CloseParen, Expression, ExpressionOptional, Keyword, KeywordNoSpace,
        OpenBlock, OpenParen, SmartEndStatement,
    },
};
use crate::environment::Environment;
use crate::evaluator::{
    evaluate_generate_all_recursive, evaluate_generate_recursive, EvaluatorContext,
    EvaluatorScope,
};
use crate::helpers::{
    block_absorb_scope, expect_evaluator_scope, find_close_paren_token_index, get_argument,
    get_expected_argument, get_num_arguments, invocation_head, is_forbidden_evaluator_scope,
};
use crate::runtime::GeneratorProcedure;

const fn op(
    operation: crate::cstatement::CStatementOperationKind,
    keyword_or_symbol: &'static str,
    argument_index: i32,
) -> CStatementOperation {
    CStatementOperation {
        operation,
        keyword_or_symbol,
        argument_index,
    }
}

struct CStatementEntry {
    name: &'static str,
    /// Exact argument count including the head; None for variadic forms.
    arity: Option<usize>,
    /// Whether the form is a statement (forbidden in expression position)
    /// rather than an operator.
    statement: bool,
    operations: &'static [CStatementOperation],
}

const WHILE_STATEMENT: &[CStatementOperation] = &[
    op(Keyword, "while", -1),
    op(OpenParen, "", -1),
    op(Expression, "condition", 1),
    op(CloseParen, "", -1),
    op(OpenBlock, "", -1),
    op(Body, "", 2),
    op(CloseBlock, "", -1),
];

const RETURN_STATEMENT: &[CStatementOperation] = &[
    op(Keyword, "return", -1),
    op(ExpressionOptional, "", 1),
    op(SmartEndStatement, "", -1),
];

const SET_STATEMENT: &[CStatementOperation] = &[
    op(Expression, "destination", 1),
    op(Keyword, "=", -1),
    op(Expression, "value", 2),
    op(SmartEndStatement, "", -1),
];

const BREAK_STATEMENT: &[CStatementOperation] =
    &[op(Keyword, "break", -1), op(SmartEndStatement, "", -1)];

const CONTINUE_STATEMENT: &[CStatementOperation] =
    &[op(Keyword, "continue", -1), op(SmartEndStatement, "", -1)];

const SCOPE_STATEMENT: &[CStatementOperation] = &[
    op(OpenBlock, "", -1),
    op(Body, "", 1),
    op(CloseBlock, "", -1),
];

const ARRAY_SUBSCRIPT: &[CStatementOperation] = &[
    op(Expression, "array", 2),
    op(KeywordNoSpace, "[", -1),
    op(Expression, "index", 1),
    op(KeywordNoSpace, "]", -1),
];

macro_rules! binary_operator {
    ($c_operator:literal) => {
        &[
            op(OpenParen, "", -1),
            op(Expression, "left operand", 1),
            op(Keyword, $c_operator, -1),
            op(Expression, "right operand", 2),
            op(CloseParen, "", -1),
        ]
    };
}

macro_rules! unary_operator {
    ($c_operator:literal) => {
        &[
            op(KeywordNoSpace, $c_operator, -1),
            op(OpenParen, "", -1),
            op(Expression, "operand", 1),
            op(CloseParen, "", -1),
        ]
    };
}

const C_STATEMENT_TABLE: &[CStatementEntry] = &[
    CStatementEntry { name: "while", arity: None, statement: true, operations: WHILE_STATEMENT },
    CStatementEntry { name: "return", arity: None, statement: true, operations: RETURN_STATEMENT },
    CStatementEntry { name: "set", arity: Some(3), statement: true, operations: SET_STATEMENT },
    CStatementEntry { name: "break", arity: Some(1), statement: true, operations: BREAK_STATEMENT },
    CStatementEntry { name: "continue", arity: Some(1), statement: true, operations: CONTINUE_STATEMENT },
    CStatementEntry { name: "scope", arity: None, statement: true, operations: SCOPE_STATEMENT },
    CStatementEntry { name: "at", arity: Some(3), statement: false, operations: ARRAY_SUBSCRIPT },
    CStatementEntry { name: "+", arity: Some(3), statement: false, operations: binary_operator!("+") },
    CStatementEntry { name: "-", arity: Some(3), statement: false, operations: binary_operator!("-") },
    CStatementEntry { name: "*", arity: Some(3), statement: false, operations: binary_operator!("*") },
    CStatementEntry { name: "/", arity: Some(3), statement: false, operations: binary_operator!("/") },
    CStatementEntry { name: "%", arity: Some(3), statement: false, operations: binary_operator!("%") },
    CStatementEntry { name: "=", arity: Some(3), statement: false, operations: binary_operator!("==") },
    CStatementEntry { name: "!=", arity: Some(3), statement: false, operations: binary_operator!("!=") },
    CStatementEntry { name: "<", arity: Some(3), statement: false, operations: binary_operator!("<") },
    CStatementEntry { name: "<=", arity: Some(3), statement: false, operations: binary_operator!("<=") },
    CStatementEntry { name: ">", arity: Some(3), statement: false, operations: binary_operator!(">") },
    CStatementEntry { name: ">=", arity: Some(3), statement: false, operations: binary_operator!(">=") },
    CStatementEntry { name: "and", arity: Some(3), statement: false, operations: binary_operator!("&&") },
    CStatementEntry { name: "or", arity: Some(3), statement: false, operations: binary_operator!("||") },
    CStatementEntry { name: "not", arity: Some(2), statement: false, operations: unary_operator!("!") },
    CStatementEntry { name: "deref", arity: Some(2), statement: false, operations: unary_operator!("*") },
    CStatementEntry { name: "addr", arity: Some(2), statement: false, operations: unary_operator!("&") },
];

/// Dispatch for every table-declared statement and operator.
fn c_statement_generator(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    let Some(entry) = C_STATEMENT_TABLE
        .iter()
        .find(|entry| entry.name == head.contents)
    else {
        emit_blamed_error(head, format!("no statement table entry for '{}'", head.contents));
        return false;
    };

    if is_forbidden_evaluator_scope(entry.name, head, context, EvaluatorScope::Module) {
        return false;
    }
    if entry.statement
        && is_forbidden_evaluator_scope(entry.name, head, context, EvaluatorScope::ExpressionsOnly)
    {
        return false;
    }
    if let Some(arity) = entry.arity {
        let count = get_num_arguments(tokens, start, end);
        if count != arity {
            emit_blamed_error(
                head,
                format!("'{}' expected {} arguments, got {count}", entry.name, arity - 1),
            );
            return false;
        }
    }

    c_statement_output(environment, context, tokens, start, entry.operations, output)
}

/// `(if condition then-statement [else-statement])`, always braced.
fn if_generator(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    if !expect_evaluator_scope("if", head, context, EvaluatorScope::Body) {
        return false;
    }
    let arguments = get_num_arguments(tokens, start, end);
    if !(3..=4).contains(&arguments) {
        emit_blamed_error(head, "expected (if condition then-statement [else-statement])");
        return false;
    }
    let Some(condition_index) = get_expected_argument("condition", tokens, start, 1, end) else {
        return false;
    };
    let Some(then_index) = get_expected_argument("then statement", tokens, start, 2, end) else {
        return false;
    };
    let else_index = get_argument(tokens, start, 3, end);

    add_string_output(&mut output.source, "if", OutputModifiers::SPACE_AFTER, head);
    add_lang_token_output(&mut output.source, OutputModifiers::OPEN_PAREN, head);
    let condition_context = context.expression_child();
    let mut errors =
        evaluate_generate_recursive(environment, &condition_context, tokens, condition_index, output);
    add_lang_token_output(
        &mut output.source,
        OutputModifiers::CLOSE_PAREN | OutputModifiers::OPEN_BLOCK,
        head,
    );

    let body_context = context.body_child(None);
    errors += evaluate_branch(environment, &body_context, tokens, then_index, output);

    if let Some(else_index) = else_index {
        add_string_output(
            &mut output.source,
            "else",
            OutputModifiers::CLOSE_BLOCK | OutputModifiers::OPEN_BLOCK,
            &tokens[else_index],
        );
        errors += evaluate_branch(environment, &body_context, tokens, else_index, output);
    }
    add_lang_token_output(&mut output.source, OutputModifiers::CLOSE_BLOCK, head);
    errors == 0
}

/// Evaluate a branch statement; a `(scope ...)` body is absorbed into the
/// block the generator already opened.
fn evaluate_branch(
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    branch_index: usize,
    output: &mut GeneratorOutput,
) -> u32 {
    let absorbed = block_absorb_scope(tokens, branch_index);
    if absorbed != branch_index {
        return evaluate_generate_all_recursive(environment, context, tokens, absorbed, output);
    }
    evaluate_generate_recursive(environment, context, tokens, branch_index, output)
}

/// Register the whole table plus `if`.
pub fn register_statement_generators(environment: &mut Environment) {
    for entry in C_STATEMENT_TABLE {
        environment.register_generator(entry.name, GeneratorProcedure::Native(c_statement_generator));
    }
    environment.register_generator("if", GeneratorProcedure::Native(if_generator));
}
