//! Iterative forward-reference resolution.
//!
//! Resolution is a batch fixed point, not per-reference callbacks: each
//! round satisfies references whose referent is now defined, propagates the
//! required flag through the reference graph (the required closure), and
//! builds required compile-time definitions. New references discovered by
//! re-evaluation or builds are appended and picked up next round. The loop
//! ends when a round makes no progress; whatever required references remain
//! are reported as unknown symbols, exactly once per name.

use tracing::{debug, trace};

use sprig_diagnostic::emit_blamed_error;

use crate::environment::{CompileTimeState, Environment, Reference};
use crate::evaluator::evaluate_generate_recursive;
use crate::hooks::run_post_resolve_hooks;
use crate::runtime::{build_compile_time_definition, CompileTimeBuilder};

/// Safety cap on hook-driven modify/resolve cycles. A hook that rewrites
/// code on every pass without settling is a bug in the hook.
pub const MAX_MODIFICATION_PASSES: u32 = 32;

/// Mark a definition (and its required closure) required. `is_required` is
/// monotonic: this only ever flips false to true.
fn mark_definition_required(environment: &mut Environment, name: &str) {
    let mut work = vec![name.to_string()];
    while let Some(current) = work.pop() {
        let Some(definition) = environment.definitions.get_mut(&current) else {
            continue;
        };
        if definition.is_required {
            continue;
        }
        definition.is_required = true;
        trace!(name = %current, "marked required");

        let referenced: Vec<String> = definition.referenced_names.keys().cloned().collect();
        for referenced_name in referenced {
            if environment.definitions.contains_key(&referenced_name) {
                work.push(referenced_name);
            } else if let Some(pool) = environment.references.get_mut(&referenced_name) {
                // The referent is not defined yet; requiredness rides on the
                // pending references until it is.
                for reference in pool.references.iter_mut() {
                    if reference.definition_name.as_deref() == Some(current.as_str()) {
                        reference.is_required = true;
                    }
                }
            }
        }
    }
}

/// Re-evaluate a satisfied reference's cursor. The provisional C-call guess
/// was wrong (the referent is a macro or generator); the real procedure is
/// installed now, so evaluating the same invocation again fills the same
/// splice with the right output.
fn reevaluate_reference(environment: &mut Environment, reference: &Reference) -> u32 {
    trace!(referent = %reference.token.contents, "re-evaluating reference");
    let cell = reference.splice.clone();
    let mut output = cell.borrow_mut();
    output.clear();
    evaluate_generate_recursive(
        environment,
        &reference.context,
        &reference.tokens,
        reference.start,
        &mut output,
    )
}

fn remove_pool(environment: &mut Environment, name: &str) -> Option<crate::environment::ReferencePool> {
    let pool = environment.references.remove(name)?;
    environment.reference_order.retain(|n| n != name);
    Some(pool)
}

/// One full fixed-point resolution. Returns false when errors were emitted.
pub fn resolve_references(
    environment: &mut Environment,
    builder: &mut dyn CompileTimeBuilder,
) -> bool {
    let mut errors: u32 = 0;

    loop {
        let mut progress = false;

        // Names demanded without a runtime reference (hook functions) join
        // the required set as soon as their definition appears.
        let demanded: Vec<String> = environment
            .required_comptime_names
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        for name in demanded {
            let already = environment
                .find_definition(&name)
                .map(|d| d.is_required);
            if already == Some(false) {
                mark_definition_required(environment, &name);
                progress = true;
            }
        }

        // Satisfy references whose referent is now defined. FIFO over pools
        // in first-insertion order.
        let queue: Vec<String> = environment.reference_order.clone();
        for name in queue {
            let Some(definition) = environment.find_definition(&name) else {
                continue;
            };
            let object_type = definition.object_type;
            let state = definition.compile_time_state;

            // Requiredness flows into the definition before satisfaction so
            // the build pass below sees it.
            let any_required = environment
                .references
                .get(&name)
                .is_some_and(|pool| pool.references.iter().any(|r| r.is_required));
            if any_required {
                mark_definition_required(environment, &name);
            }

            if object_type.is_compile_time() && state != CompileTimeState::Built {
                if state == CompileTimeState::Failed {
                    // The build error was already reported; the name still
                    // counts as defined so it is not re-reported as unknown.
                    remove_pool(environment, &name);
                    progress = true;
                }
                // Pending: wait for the build pass.
                continue;
            }

            let Some(pool) = remove_pool(environment, &name) else {
                continue;
            };
            debug!(name = %name, references = pool.references.len(), "references satisfied");
            if object_type.is_compile_time() {
                for reference in &pool.references {
                    errors += reevaluate_reference(environment, reference);
                }
            }
            progress = true;
        }

        // Build required compile-time definitions not yet built. Results
        // merge in definition registration order regardless of how the
        // builder schedules the work.
        let pending: Vec<String> = environment
            .definitions
            .iter()
            .filter(|(_, d)| d.is_required && d.compile_time_state == CompileTimeState::Pending)
            .map(|(name, _)| name.clone())
            .collect();
        for name in pending {
            if !build_compile_time_definition(environment, builder, &name) {
                errors += 1;
            }
            // Built or Pending→Failed: either transition is progress. Failed
            // names are dropped by the next satisfaction round, so a broken
            // build is reported exactly once rather than again as an unknown
            // symbol.
            progress = true;
        }

        if !progress {
            break;
        }
    }

    // Everything left is unresolved. Unrequired references are pruned
    // silently; required ones are unknown symbols, one error per name.
    for name in environment.reference_order.clone() {
        let Some(pool) = environment.references.get(&name) else {
            continue;
        };
        if let Some(reference) = pool.references.iter().find(|r| r.is_required) {
            emit_blamed_error(&reference.token, format!("unknown symbol '{name}'"));
            errors += 1;
        }
    }

    errors == 0
}

/// Resolution plus post-resolution hooks, re-entering resolution while hooks
/// keep modifying code.
pub fn evaluate_resolve_references(
    environment: &mut Environment,
    builder: &mut dyn CompileTimeBuilder,
) -> bool {
    let mut passes = 0;
    loop {
        if !resolve_references(environment, builder) {
            return false;
        }
        environment.was_code_modified = false;
        if !run_post_resolve_hooks(environment) {
            return false;
        }
        if !environment.was_code_modified {
            return true;
        }
        passes += 1;
        if passes >= MAX_MODIFICATION_PASSES {
            if let Some(hook) = environment.hooks.first() {
                emit_blamed_error(
                    &hook.blame,
                    format!(
                        "hooks kept modifying code after {MAX_MODIFICATION_PASSES} resolution passes"
                    ),
                );
            }
            return false;
        }
        debug!(pass = passes, "hooks modified code; re-entering resolution");
    }
}
