//! Hook invocation and in-place redefinition.
//!
//! Hooks are compile-time functions attached to a named phase. They run in
//! registration order; a false return aborts the phase. The machinery does
//! not deduplicate rewrites — a hook that must not rewrite twice carries its
//! own idempotence flag.

use tracing::debug;

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{validate_parentheses, TokenRun};
use sprig_output::GeneratorOutput;

use crate::environment::{Environment, HookPhase, HookRequest};
use crate::evaluator::{evaluate_generate_recursive, EvaluatorContext, EvaluatorScope};
use crate::runtime::{invoke_post_resolve_hook, invoke_pre_link_hook};

fn hook_requests_for(environment: &Environment, phase: HookPhase) -> Vec<HookRequest> {
    environment
        .hooks
        .iter()
        .filter(|request| request.phase == phase)
        .cloned()
        .collect()
}

/// Run all `post-references-resolved` hooks in registration order.
pub fn run_post_resolve_hooks(environment: &mut Environment) -> bool {
    for request in hook_requests_for(environment, HookPhase::PostReferencesResolved) {
        let Some(procedure) = environment
            .comptime_functions
            .get(&request.function_name)
            .copied()
        else {
            emit_blamed_error(
                &request.blame,
                format!("hook function '{}' was never built", request.function_name),
            );
            return false;
        };
        debug!(hook = %request.function_name, "running post-references-resolved hook");
        if !invoke_post_resolve_hook(procedure, environment) {
            emit_blamed_error(
                &request.blame,
                format!(
                    "post-references-resolved hook '{}' failed",
                    request.function_name
                ),
            );
            return false;
        }
    }
    true
}

/// Run all `pre-link` hooks in registration order; they may append link
/// arguments.
pub fn run_pre_link_hooks(environment: &mut Environment, link_command: &mut Vec<String>) -> bool {
    for request in hook_requests_for(environment, HookPhase::PreLink) {
        let Some(procedure) = environment
            .comptime_functions
            .get(&request.function_name)
            .copied()
        else {
            emit_blamed_error(
                &request.blame,
                format!("hook function '{}' was never built", request.function_name),
            );
            return false;
        };
        debug!(hook = %request.function_name, "running pre-link hook");
        if !invoke_pre_link_hook(procedure, environment, link_command) {
            emit_blamed_error(
                &request.blame,
                format!("pre-link hook '{}' failed", request.function_name),
            );
            return false;
        }
    }
    true
}

/// Rewrite an existing definition in place — the only sanctioned mutation
/// path.
///
/// The definition keeps its table entry (identity, requiredness, and the
/// output cell every parent splice points at); only its accumulated output
/// and bookkeeping are discarded. `new_tokens` is re-evaluated in a context
/// pinned to the original module and definition, so references discovered
/// during re-evaluation blame the right place and re-queue for the next
/// resolution pass. Sets `was_code_modified`; the driver re-enters
/// resolution after the hook phase when it is set.
pub fn replace_and_evaluate_definition(
    environment: &mut Environment,
    name: &str,
    new_tokens: &TokenRun,
) -> bool {
    if let Err(error) = validate_parentheses(new_tokens) {
        emit_blamed_error(
            error.blame(),
            format!("replacement for '{name}' is unbalanced: {error}"),
        );
        return false;
    }

    let Some(definition) = environment.find_definition(name) else {
        if let Some(token) = new_tokens.first() {
            emit_blamed_error(token, format!("cannot replace unknown definition '{name}'"));
        }
        return false;
    };
    let module = definition.module.clone();
    let name_token = definition.name.clone();
    let is_required = definition.is_required;
    let Some(cell) = definition.output.clone() else {
        emit_blamed_error(&name_token, format!("'{name}' has no output to replace"));
        return false;
    };

    debug!(name = %name, "replacing and re-evaluating definition");
    if let Some(definition) = environment.find_definition_mut(name) {
        definition.referenced_names.clear();
        definition.macro_expansions.clear();
    }
    cell.borrow_mut().clear();

    let context = EvaluatorContext {
        scope: EvaluatorScope::Module,
        module,
        definition_name: Some(name_token),
        is_required,
        delimiter_template: None,
    };

    // The defining generator runs again and lands in the redefinition path
    // of add_object_definition, which refills the original cell. The scratch
    // output only catches the discarded splice marker.
    environment.begin_redefinition(name);
    let mut scratch = GeneratorOutput::new();
    let errors = evaluate_generate_recursive(environment, &context, new_tokens, 0, &mut scratch);
    environment.end_redefinition();

    environment.was_code_modified = true;
    errors == 0
}
