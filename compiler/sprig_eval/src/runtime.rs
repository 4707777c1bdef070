//! Compile-time procedure runtime.
//!
//! The three registries hold tagged procedures: `Native` function pointers
//! (built-ins and test doubles) and `Loaded` symbols resolved from
//! compile-time artifact libraries. Loaded symbols are called through
//! `extern "C"` trampolines with opaque pointers; the generated code calls
//! back through [`crate::capi`] to manipulate tokens and output. All
//! unsafety is confined to this module.

use std::ffi::c_void;
use std::fmt;

use tracing::{debug, warn};

use sprig_diagnostic::{emit_blamed_error, emit_blamed_warning};
use sprig_lexer::{tokenize_file_contents, Token, TokenRun};
use sprig_output::{
    render_stream, GeneratorOutput, NameStyleSettings, StreamKind, WriterFormatSettings,
};

use crate::environment::{CompileTimeState, Environment, ObjectType};
use crate::evaluator::EvaluatorContext;
use crate::helpers::find_close_paren_token_index;

/// Built-in generator signature.
pub type NativeGeneratorFn =
    fn(&mut Environment, &EvaluatorContext, &TokenRun, usize, &mut GeneratorOutput) -> bool;

/// Built-in macro signature. On success the expansion tokens are appended to
/// the out parameter; the environment takes ownership of them afterwards.
pub type NativeMacroFn =
    fn(&mut Environment, &EvaluatorContext, &TokenRun, usize, &mut Vec<Token>) -> bool;

/// Native `post-references-resolved` hook signature.
pub type NativePostResolveHookFn = fn(&mut Environment) -> bool;

/// Native `pre-link` hook signature: may append link arguments.
pub type NativePreLinkHookFn = fn(&mut Environment, &mut Vec<String>) -> bool;

/// An untyped symbol loaded from a compile-time artifact library.
///
/// The library stays loaded (owned by the builder) until after environment
/// teardown, so the pointer is valid whenever the environment is.
#[derive(Clone, Copy, Debug)]
pub struct RawProcedure(pub *const c_void);

#[derive(Clone, Copy, Debug)]
pub enum GeneratorProcedure {
    Native(NativeGeneratorFn),
    Loaded(RawProcedure),
}

#[derive(Clone, Copy, Debug)]
pub enum MacroProcedure {
    Native(NativeMacroFn),
    Loaded(RawProcedure),
}

/// A compile-time function attachable to a hook phase.
#[derive(Clone, Copy, Debug)]
pub enum HookProcedure {
    NativePostResolve(NativePostResolveHookFn),
    NativePreLink(NativePreLinkHookFn),
    Loaded(RawProcedure),
}

type RawGeneratorSignature =
    unsafe extern "C" fn(*mut c_void, *const c_void, *const c_void, i32, *mut c_void) -> bool;
type RawMacroSignature =
    unsafe extern "C" fn(*mut c_void, *const c_void, *const c_void, i32, *mut c_void) -> bool;
type RawPostResolveSignature = unsafe extern "C" fn(*mut c_void) -> bool;
type RawPreLinkSignature = unsafe extern "C" fn(*mut c_void, *mut c_void) -> bool;

/// Invoke a generator procedure, writing into `output`.
pub fn invoke_generator(
    procedure: GeneratorProcedure,
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    output: &mut GeneratorOutput,
) -> bool {
    match procedure {
        GeneratorProcedure::Native(function) => {
            function(environment, context, tokens, start, output)
        }
        GeneratorProcedure::Loaded(raw) => unsafe {
            let function: RawGeneratorSignature = std::mem::transmute(raw.0);
            function(
                environment as *mut Environment as *mut c_void,
                context as *const EvaluatorContext as *const c_void,
                tokens as *const TokenRun as *const c_void,
                start as i32,
                output as *mut GeneratorOutput as *mut c_void,
            )
        },
    }
}

/// Invoke a macro procedure, collecting expansion tokens.
pub fn invoke_macro(
    procedure: MacroProcedure,
    environment: &mut Environment,
    context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    expansion: &mut Vec<Token>,
) -> bool {
    match procedure {
        MacroProcedure::Native(function) => {
            function(environment, context, tokens, start, expansion)
        }
        MacroProcedure::Loaded(raw) => unsafe {
            let function: RawMacroSignature = std::mem::transmute(raw.0);
            function(
                environment as *mut Environment as *mut c_void,
                context as *const EvaluatorContext as *const c_void,
                tokens as *const TokenRun as *const c_void,
                start as i32,
                expansion as *mut Vec<Token> as *mut c_void,
            )
        },
    }
}

/// Invoke a `post-references-resolved` hook.
pub fn invoke_post_resolve_hook(procedure: HookProcedure, environment: &mut Environment) -> bool {
    match procedure {
        HookProcedure::NativePostResolve(function) => function(environment),
        HookProcedure::NativePreLink(_) => false,
        HookProcedure::Loaded(raw) => unsafe {
            let function: RawPostResolveSignature = std::mem::transmute(raw.0);
            function(environment as *mut Environment as *mut c_void)
        },
    }
}

/// Invoke a `pre-link` hook with the mutable link command.
pub fn invoke_pre_link_hook(
    procedure: HookProcedure,
    environment: &mut Environment,
    link_command: &mut Vec<String>,
) -> bool {
    match procedure {
        HookProcedure::NativePreLink(function) => function(environment, link_command),
        HookProcedure::NativePostResolve(_) => false,
        HookProcedure::Loaded(raw) => unsafe {
            let function: RawPreLinkSignature = std::mem::transmute(raw.0);
            function(
                environment as *mut Environment as *mut c_void,
                link_command as *mut Vec<String> as *mut c_void,
            )
        },
    }
}

/// Which stage of a compile-time build failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    Compile,
    Link,
    Load,
    ResolveSymbol,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Compile => f.write_str("compile"),
            BuildStage::Link => f.write_str("link"),
            BuildStage::Load => f.write_str("load"),
            BuildStage::ResolveSymbol => f.write_str("symbol resolution"),
        }
    }
}

/// Failure from the build/link collaborator.
#[derive(Debug)]
pub struct CompileTimeBuildError {
    pub stage: BuildStage,
    pub message: String,
}

impl fmt::Display for CompileTimeBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

impl std::error::Error for CompileTimeBuildError {}

/// A procedure produced by the builder, ready to install in a registry.
#[derive(Debug)]
pub enum BuiltProcedure {
    Macro(MacroProcedure),
    Generator(GeneratorProcedure),
    Function(HookProcedure),
}

/// The build/link collaborator interface the resolver drives.
///
/// Given rendered source text for one compile-time definition, produce a
/// callable procedure. The real implementation compiles a dynamic library
/// and resolves a symbol; tests substitute native procedures.
pub trait CompileTimeBuilder {
    fn build_and_load(
        &mut self,
        name: &str,
        source_text: &str,
        object_type: ObjectType,
        link_arguments: &[String],
    ) -> Result<BuiltProcedure, CompileTimeBuildError>;
}

/// A builder for evaluate-only runs: every build request fails.
pub struct UnavailableBuilder;

impl CompileTimeBuilder for UnavailableBuilder {
    fn build_and_load(
        &mut self,
        _name: &str,
        _source_text: &str,
        _object_type: ObjectType,
        _link_arguments: &[String],
    ) -> Result<BuiltProcedure, CompileTimeBuildError> {
        Err(CompileTimeBuildError {
            stage: BuildStage::Compile,
            message: "no compile-time builder configured".to_string(),
        })
    }
}

/// Validate a compile-time function's parameter list against a canonical
/// signature. Token kinds and symbol spellings must match exactly.
pub fn compile_time_function_signature_matches(
    environment: &Environment,
    error_token: &Token,
    name: &str,
    expected_signature: &str,
) -> bool {
    let Some(definition) = environment.find_definition(name) else {
        emit_blamed_error(error_token, format!("unknown compile-time function '{name}'"));
        return false;
    };
    let Some((run, start)) = &definition.signature else {
        emit_blamed_error(
            error_token,
            format!("compile-time function '{name}' has no recorded signature"),
        );
        return false;
    };

    let signature_file: std::sync::Arc<str> = std::sync::Arc::from("<signature>");
    let expected = match tokenize_file_contents(expected_signature, &signature_file) {
        Ok(tokens) => tokens,
        Err(error) => {
            emit_blamed_error(
                error_token,
                format!("internal: canonical signature failed to tokenize: {error}"),
            );
            return false;
        }
    };

    let end = find_close_paren_token_index(run, *start);
    let actual = &run[*start..=end];
    let matches = actual.len() == expected.len()
        && actual.iter().zip(expected.iter()).all(|(a, b)| {
            a.kind == b.kind && (a.kind != sprig_lexer::TokenKind::Symbol || a.contents == b.contents)
        });

    if !matches {
        emit_blamed_error(
            error_token,
            format!(
                "compile-time function '{name}' signature does not match the expected signature {expected_signature}"
            ),
        );
        return false;
    }
    true
}

/// Build one pending compile-time definition and install the result.
///
/// Returns true when the registry gained a procedure. A failed build is
/// reported once (error when the definition is required, warning otherwise)
/// and the definition is marked [`CompileTimeState::Failed`] so it is never
/// retried or re-reported.
pub fn build_compile_time_definition(
    environment: &mut Environment,
    builder: &mut dyn CompileTimeBuilder,
    name: &str,
) -> bool {
    let Some(definition) = environment.find_definition(name) else {
        return false;
    };
    debug_assert_eq!(definition.compile_time_state, CompileTimeState::Pending);
    let object_type = definition.object_type;
    let name_token = definition.name.clone();
    let is_required = definition.is_required;

    // A hook-bound function must declare the canonical signature for its
    // phase before it is worth building.
    let expected_signature = definition.expected_signature.or_else(|| {
        environment
            .hooks
            .iter()
            .find(|hook| hook.function_name == name)
            .map(|hook| hook.phase.expected_signature())
    });
    if let Some(expected) = expected_signature {
        if !compile_time_function_signature_matches(environment, &name_token, name, expected) {
            if let Some(definition) = environment.find_definition_mut(name) {
                definition.compile_time_state = CompileTimeState::Failed;
            }
            return false;
        }
    }

    let source_text = match environment.find_definition(name).and_then(|d| d.output.clone()) {
        Some(cell) => render_stream(
            &cell.borrow(),
            StreamKind::Source,
            &NameStyleSettings::default(),
            &WriterFormatSettings::default(),
        ),
        None => String::new(),
    };

    debug!(name = %name, ?object_type, "building compile-time definition");
    let link_arguments = environment.comptime_link_arguments.clone();
    match builder.build_and_load(name, &source_text, object_type, &link_arguments) {
        Ok(built) => {
            match built {
                BuiltProcedure::Macro(procedure) => environment.register_macro(name, procedure),
                BuiltProcedure::Generator(procedure) => {
                    environment.register_generator(name, procedure)
                }
                BuiltProcedure::Function(procedure) => {
                    environment.comptime_functions.insert(name.to_string(), procedure);
                }
            }
            if let Some(definition) = environment.find_definition_mut(name) {
                definition.compile_time_state = CompileTimeState::Built;
            }
            true
        }
        Err(error) => {
            if is_required {
                emit_blamed_error(
                    &name_token,
                    format!("compile-time build of '{name}' failed: {error}"),
                );
            } else {
                emit_blamed_warning(
                    &name_token,
                    format!("compile-time build of unrequired '{name}' failed: {error}"),
                );
                warn!(name = %name, %error, "unrequired compile-time build failed");
            }
            if let Some(definition) = environment.find_definition_mut(name) {
                definition.compile_time_state = CompileTimeState::Failed;
            }
            false
        }
    }
}
