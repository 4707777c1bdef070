//! The fundamental generator catalog, installed at environment construction.
//!
//! User-defined generators registered later replace these silently; built-in
//! behavior is a default, not a reservation.

mod comptime;
mod functions;
mod statements;
mod variables;

pub use functions::{
    output_function_arguments, output_function_return_type, parse_function_signature,
    FunctionArgumentTokens,
};

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{TokenKind, TokenRun};
use sprig_output::{add_string_output, GeneratorOutput, OutputModifiers};

use crate::environment::Environment;
use crate::evaluator::{EvaluatorContext, EvaluatorScope};
use crate::helpers::{
    expect_evaluator_scope, find_close_paren_token_index, get_next_argument, invocation_head,
};
use crate::runtime::GeneratorProcedure;

/// `(c-import "stdio.h" &with-decls "our-api.h")`: emit `#include` lines.
///
/// Imports land in the source file by default; `&with-decls` switches the
/// following imports to the header, `&with-defs` switches back. Names given
/// as `<...>` keep angle brackets, everything else is quoted.
fn c_import_generator(
    _environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = invocation_head(tokens, start);
    if !expect_evaluator_scope("c-import", head, context, EvaluatorScope::Module) {
        return false;
    }

    let mut to_header = false;
    let mut index = get_next_argument(tokens, start + 1, end);
    while index < end {
        let token = &tokens[index];
        match token.kind {
            TokenKind::Symbol if token.contents == "&with-decls" => to_header = true,
            TokenKind::Symbol if token.contents == "&with-defs" => to_header = false,
            TokenKind::String => {
                let include = if token.contents.starts_with('<') {
                    format!("#include {}", token.contents)
                } else {
                    format!("#include \"{}\"", token.contents)
                };
                let stream = if to_header {
                    &mut output.header
                } else {
                    &mut output.source
                };
                add_string_output(stream, include, OutputModifiers::NEWLINE_AFTER, token);
            }
            _ => {
                emit_blamed_error(token, "expected an include path string or &with-decls/&with-defs");
                return false;
            }
        }
        index = get_next_argument(tokens, index, end);
    }
    true
}

/// Install every built-in generator. Called once from `Environment::new`.
pub fn register_fundamental_generators(environment: &mut Environment) {
    environment.register_generator(
        "defun",
        GeneratorProcedure::Native(functions::defun_generator),
    );
    environment.register_generator(
        "defun-local",
        GeneratorProcedure::Native(functions::defun_generator),
    );
    environment.register_generator("var", GeneratorProcedure::Native(variables::var_generator));
    environment.register_generator("c-import", GeneratorProcedure::Native(c_import_generator));

    environment.register_generator(
        "defmacro",
        GeneratorProcedure::Native(comptime::defmacro_generator),
    );
    environment.register_generator(
        "defgenerator",
        GeneratorProcedure::Native(comptime::defgenerator_generator),
    );
    environment.register_generator(
        "defun-comptime",
        GeneratorProcedure::Native(comptime::defgenerator_generator),
    );
    environment.register_generator(
        "add-compile-time-hook",
        GeneratorProcedure::Native(comptime::add_compile_time_hook_generator),
    );
    environment.register_generator(
        "tokenize-push",
        GeneratorProcedure::Native(comptime::tokenize_push_generator),
    );
    environment.register_generator(
        "comptime-error",
        GeneratorProcedure::Native(comptime::comptime_error_generator),
    );

    statements::register_statement_generators(environment);
}
