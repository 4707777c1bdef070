//! Sprig evaluator: token-stream driven, multi-phase code generation.
//!
//! This crate is the core of the transpiler. It walks sealed token runs
//! under an [`EvaluatorContext`], dispatching each form to a generator, a
//! macro, or the unknown-symbol path; accumulates [`sprig_output`] fragments
//! on [`ObjectDefinition`]s; resolves forward references to a fixed point
//! (building and loading user compile-time procedures along the way); and
//! finally runs user hooks that may rewrite definitions in place.
//!
//! # Phases
//!
//! 1. Modules evaluate ([`evaluate_generate_all_recursive`]), registering
//!    definitions and provisional references.
//! 2. The resolver ([`resolve_references`]) satisfies references, propagates
//!    the required closure, and drives compile-time builds.
//! 3. `post-references-resolved` hooks run; if they modify code, resolution
//!    re-enters ([`evaluate_resolve_references`]).
//!
//! All of it is single-threaded on the driver thread; the only blocking
//! point is the build collaborator waiting on subprocesses.

pub mod builtins;
pub mod capi;
mod cstatement;
mod ctype;
mod environment;
mod evaluator;
pub mod helpers;
mod hooks;
mod resolver;
mod runtime;

pub use cstatement::{c_statement_output, CStatementOperation, CStatementOperationKind};
pub use ctype::tokenized_c_type_to_string_recursive;
pub use environment::{
    CompileTimeState, Environment, HookPhase, HookRequest, MacroExpansion, ObjectDefinition,
    ObjectType, Reference, ReferencePool,
};
pub use evaluator::{
    evaluate_generate_all_recursive, evaluate_generate_recursive, EvaluatorContext,
    EvaluatorScope,
};
pub use hooks::{replace_and_evaluate_definition, run_post_resolve_hooks, run_pre_link_hooks};
pub use resolver::{
    evaluate_resolve_references, resolve_references, MAX_MODIFICATION_PASSES,
};
pub use runtime::{
    build_compile_time_definition, compile_time_function_signature_matches, BuildStage,
    BuiltProcedure, CompileTimeBuildError, CompileTimeBuilder, GeneratorProcedure, HookProcedure,
    MacroProcedure, NativeGeneratorFn, NativeMacroFn, NativePostResolveHookFn,
    NativePreLinkHookFn, RawProcedure, UnavailableBuilder,
};

#[cfg(test)]
mod tests;
