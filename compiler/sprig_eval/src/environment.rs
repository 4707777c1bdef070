//! The evaluator environment: every long-lived datum of one compilation.
//!
//! The environment is a single value threaded explicitly through every
//! evaluator, generator, macro, resolver, and hook call — never ambient
//! state. It owns the definition table, the three procedure registries, the
//! pending-reference pools, and every compile-time token run, which is what
//! makes token addresses stable until [`Environment::destroy`].

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHasher};
use tracing::{debug, trace};

use sprig_diagnostic::emit_blamed_error;
use sprig_lexer::{Token, TokenRun};
use sprig_output::OutputCell;

use crate::evaluator::EvaluatorContext;
use crate::runtime::{GeneratorProcedure, HookProcedure, MacroProcedure};

/// What kind of object a definition is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectType {
    Function,
    Variable,
    Macro,
    Generator,
    CompileTimeFunction,
}

impl ObjectType {
    /// Whether this definition is built and invoked at compile time.
    #[inline]
    pub fn is_compile_time(self) -> bool {
        matches!(
            self,
            ObjectType::Macro | ObjectType::Generator | ObjectType::CompileTimeFunction
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            ObjectType::Function => "function",
            ObjectType::Variable => "variable",
            ObjectType::Macro => "macro",
            ObjectType::Generator => "generator",
            ObjectType::CompileTimeFunction => "compile-time function",
        }
    }
}

/// Build progress of a compile-time definition.
///
/// `Failed` still counts as "defined" for deduplication, so the user sees
/// exactly one error per broken compile-time procedure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompileTimeState {
    /// Not a compile-time definition.
    #[default]
    NotCompileTime,
    /// Awaiting build by the resolver.
    Pending,
    /// Built and installed in its registry.
    Built,
    /// Build failed; do not retry, do not re-report.
    Failed,
}

/// A recorded macro expansion inside a definition's body.
///
/// Needed to copy a definition with macros already expanded (hooks iterate
/// over snapshots while mutating the live table).
#[derive(Clone, Debug)]
pub struct MacroExpansion {
    /// Run containing the invocation site.
    pub site_run: TokenRun,
    /// Index of the invocation's open paren (or bare symbol) in `site_run`.
    pub site_start: usize,
    /// The expansion, owned by the environment.
    pub expansion: TokenRun,
}

/// A named, typed, evaluable source entity.
#[derive(Debug)]
pub struct ObjectDefinition {
    pub name: Token,
    pub object_type: ObjectType,
    /// Output accumulated by evaluating this definition. Splice markers in
    /// the module output point at this cell, so redefinition clears and
    /// refills it rather than replacing it.
    pub output: Option<OutputCell>,
    /// Names this definition referenced before they were known, mapped to
    /// the first referring token. Drives required-closure propagation.
    pub referenced_names: FxHashMap<String, Token>,
    /// Monotonic: false→true only. Governs what the writer includes and
    /// which compile-time builds are mandatory.
    pub is_required: bool,
    pub module: Option<Arc<str>>,
    /// The whole defining form, for redefinition and expanded copies.
    pub invocation: Option<(TokenRun, usize)>,
    /// Open paren of the parameter list, for signature validation of
    /// compile-time functions.
    pub signature: Option<(TokenRun, usize)>,
    /// Canonical signature key this definition must match, when it is a
    /// compile-time function bound to a hook phase.
    pub expected_signature: Option<&'static str>,
    pub compile_time_state: CompileTimeState,
    pub macro_expansions: Vec<MacroExpansion>,
}

impl ObjectDefinition {
    /// A definition with only the always-meaningful fields filled in.
    pub fn new(name: Token, object_type: ObjectType, module: Option<Arc<str>>) -> ObjectDefinition {
        ObjectDefinition {
            name,
            object_type,
            output: None,
            referenced_names: FxHashMap::default(),
            is_required: false,
            module,
            invocation: None,
            signature: None,
            expected_signature: None,
            compile_time_state: CompileTimeState::NotCompileTime,
            macro_expansions: Vec::new(),
        }
    }
}

/// A pending use of a symbol that was unknown at evaluation time.
#[derive(Clone, Debug)]
pub struct Reference {
    /// Name of the definition the use happened inside, for blame and
    /// required propagation. `None` only for synthetic references.
    pub definition_name: Option<String>,
    /// The referring token (the invocation head).
    pub token: Token,
    /// Re-evaluation cursor: the invocation's run and start index.
    pub tokens: TokenRun,
    pub start: usize,
    /// Context snapshot to re-evaluate under if the referent turns out to be
    /// a macro or generator.
    pub context: EvaluatorContext,
    /// Where the provisional C-call output went; cleared and refilled on
    /// re-evaluation.
    pub splice: OutputCell,
    pub is_required: bool,
}

/// Insertion-ordered list of references to one name.
#[derive(Debug, Default)]
pub struct ReferencePool {
    pub references: Vec<Reference>,
}

/// The two hook points user code can attach to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookPhase {
    PostReferencesResolved,
    PreLink,
}

impl HookPhase {
    /// Parse a stable phase name. Unknown phases are not silently accepted.
    pub fn from_name(name: &str) -> Option<HookPhase> {
        match name {
            "post-references-resolved" => Some(HookPhase::PostReferencesResolved),
            "pre-link" => Some(HookPhase::PreLink),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HookPhase::PostReferencesResolved => "post-references-resolved",
            HookPhase::PreLink => "pre-link",
        }
    }

    /// Canonical parameter list a compile-time function must declare to be
    /// attached to this phase.
    pub fn expected_signature(self) -> &'static str {
        match self {
            HookPhase::PostReferencesResolved => "(environment (ref EvaluatorEnvironment) &return bool)",
            HookPhase::PreLink => {
                "(environment (ref EvaluatorEnvironment) link-command (ref LinkCommand) &return bool)"
            }
        }
    }
}

/// A registered hook: resolved to a procedure when its phase runs.
#[derive(Clone, Debug)]
pub struct HookRequest {
    pub phase: HookPhase,
    pub function_name: String,
    pub blame: Token,
}

/// Process-wide registry of definitions, procedures, pending references,
/// hooks, and compile-time token runs.
pub struct Environment {
    pub definitions: FxHashMap<String, ObjectDefinition>,
    pub macros: FxHashMap<String, MacroProcedure>,
    pub generators: FxHashMap<String, GeneratorProcedure>,
    /// Built compile-time functions (hook bodies), by name.
    pub comptime_functions: FxHashMap<String, HookProcedure>,
    /// Pending references keyed by referent name.
    pub references: FxHashMap<String, ReferencePool>,
    /// First-insertion order of `references` keys; resolution is FIFO.
    pub reference_order: Vec<String>,
    /// Token runs synthesized at compile time (macro expansions, definition
    /// copies). Owned here so cursors into them stay valid until teardown.
    pub comptime_runs: Vec<TokenRun>,
    pub hooks: Vec<HookRequest>,
    /// Names that must be built even without a runtime reference (hook
    /// functions), with the token that demanded them.
    pub required_comptime_names: Vec<(String, Token)>,
    /// Extra arguments pre-link hooks have appended for compile-time links.
    pub comptime_link_arguments: Vec<String>,
    /// Set by [`crate::hooks::replace_and_evaluate_definition`]; tells the
    /// driver to re-enter reference resolution.
    pub was_code_modified: bool,
    next_unique_symbol: u64,
    context_unique_counters: FxHashMap<u64, u64>,
    redefinition_in_progress: Option<String>,
}

impl Environment {
    /// Construct an environment with the built-in generators installed.
    pub fn new() -> Environment {
        let mut environment = Environment {
            definitions: FxHashMap::default(),
            macros: FxHashMap::default(),
            generators: FxHashMap::default(),
            comptime_functions: FxHashMap::default(),
            references: FxHashMap::default(),
            reference_order: Vec::new(),
            comptime_runs: Vec::new(),
            hooks: Vec::new(),
            required_comptime_names: Vec::new(),
            comptime_link_arguments: Vec::new(),
            was_code_modified: false,
            next_unique_symbol: 0,
            context_unique_counters: FxHashMap::default(),
            redefinition_in_progress: None,
        };
        crate::builtins::register_fundamental_generators(&mut environment);
        environment
    }

    /// Add a definition. Returns false (with a blamed diagnostic) on a name
    /// collision outside the explicit redefinition path.
    pub fn add_object_definition(&mut self, definition: ObjectDefinition) -> bool {
        let name = definition.name.contents.clone();

        if self.redefinition_in_progress.as_deref() == Some(name.as_str()) {
            return self.merge_redefinition(definition);
        }

        if let Some(existing) = self.definitions.get(&name) {
            emit_blamed_error(
                &definition.name,
                format!("'{name}' is already defined as a {}", existing.object_type.description()),
            );
            sprig_diagnostic::emit_blamed_note(&existing.name, "previous definition is here");
            return false;
        }

        trace!(name = %name, object_type = ?definition.object_type, "adding definition");
        self.definitions.insert(name, definition);
        true
    }

    /// The sanctioned redefinition path: keep the existing entry (identity,
    /// requiredness, output cell) and move the new content into it.
    fn merge_redefinition(&mut self, replacement: ObjectDefinition) -> bool {
        let name = replacement.name.contents.clone();
        let Some(existing) = self.definitions.get_mut(&name) else {
            emit_blamed_error(&replacement.name, format!("cannot redefine unknown '{name}'"));
            return false;
        };

        match (existing.output.clone(), replacement.output.clone()) {
            (Some(old_cell), Some(new_cell)) if !old_cell.same_cell(&new_cell) => {
                let mut old = old_cell.borrow_mut();
                let mut new = new_cell.borrow_mut();
                old.clear();
                old.source.append(&mut new.source);
                old.header.append(&mut new.header);
            }
            (None, Some(new_cell)) => existing.output = Some(new_cell),
            _ => {}
        }
        existing.object_type = replacement.object_type;
        existing.invocation = replacement.invocation;
        existing.signature = replacement.signature;
        existing.macro_expansions = replacement.macro_expansions;
        debug!(name = %name, "redefined in place");
        true
    }

    pub fn find_definition(&self, name: &str) -> Option<&ObjectDefinition> {
        self.definitions.get(name)
    }

    pub fn find_definition_mut(&mut self, name: &str) -> Option<&mut ObjectDefinition> {
        self.definitions.get_mut(name)
    }

    /// Record a pending use of `referent`. Pools are FIFO; a pool's first
    /// insertion fixes its position in the resolution order.
    pub fn add_reference(&mut self, reference: Reference) {
        let name = reference.token.contents.clone();

        if let Some(definition_name) = &reference.definition_name {
            if let Some(definition) = self.definitions.get_mut(definition_name) {
                definition
                    .referenced_names
                    .entry(name.clone())
                    .or_insert_with(|| reference.token.clone());
            }
        }

        trace!(referent = %name, from = ?reference.definition_name, "recording reference");
        if !self.references.contains_key(&name) {
            self.reference_order.push(name.clone());
        }
        self.references.entry(name).or_default().references.push(reference);
    }

    /// Install a macro. Duplicate registration replaces silently: built-ins
    /// are installed first, so user definitions win.
    pub fn register_macro(&mut self, name: impl Into<String>, procedure: MacroProcedure) {
        self.macros.insert(name.into(), procedure);
    }

    /// Install a generator. Same replacement policy as [`Self::register_macro`].
    pub fn register_generator(&mut self, name: impl Into<String>, procedure: GeneratorProcedure) {
        self.generators.insert(name.into(), procedure);
    }

    /// Take ownership of tokens synthesized at compile time, sealing them.
    /// The returned clone shares the sealed storage.
    pub fn add_comptime_run(&mut self, tokens: Vec<Token>) -> TokenRun {
        let run = TokenRun::seal(tokens);
        self.comptime_runs.push(run.clone());
        run
    }

    /// Record a macro expansion on the definition currently being evaluated.
    pub fn record_macro_expansion(
        &mut self,
        context: &EvaluatorContext,
        site_run: TokenRun,
        site_start: usize,
        expansion: TokenRun,
    ) {
        let Some(definition_name) = &context.definition_name else {
            return;
        };
        if let Some(definition) = self.definitions.get_mut(&definition_name.contents) {
            definition.macro_expansions.push(MacroExpansion {
                site_run,
                site_start,
                expansion,
            });
        }
    }

    /// Globally unique symbol with a documenting prefix. Explicitly unstable
    /// across runs: the counter depends on evaluation order.
    pub fn make_unique_symbol_name(&mut self, prefix: &str, blame: &Token) -> Token {
        let token = Token::synthesized_symbol(
            format!("{prefix}_{}", self.next_unique_symbol),
            blame,
        );
        self.next_unique_symbol += 1;
        token
    }

    /// Unique symbol stable across runs given a stable context: keyed by a
    /// hash of the surrounding definition's name plus a per-context counter.
    pub fn make_context_unique_symbol_name(
        &mut self,
        context: &EvaluatorContext,
        prefix: &str,
        blame: &Token,
    ) -> Token {
        let mut hasher = FxHasher::default();
        let definition_name = context
            .definition_name
            .as_ref()
            .map(|token| token.contents.as_str())
            .unwrap_or("");
        definition_name.hash(&mut hasher);
        let key = hasher.finish();

        let counter = self.context_unique_counters.entry(key).or_insert(0);
        let token = Token::synthesized_symbol(format!("{prefix}_{key:x}_{counter}"), blame);
        *counter += 1;
        token
    }

    /// Require a compile-time function by name even without a runtime
    /// reference (used by hook registration; the function may not be defined
    /// yet).
    pub fn require_comptime_function(&mut self, name: impl Into<String>, blame: &Token) {
        self.required_comptime_names.push((name.into(), blame.clone()));
    }

    pub(crate) fn begin_redefinition(&mut self, name: &str) {
        self.redefinition_in_progress = Some(name.to_string());
    }

    pub(crate) fn end_redefinition(&mut self) {
        self.redefinition_in_progress = None;
    }

    /// Tear down the environment, releasing owned compile-time token runs.
    ///
    /// Cursors cloned out of the environment keep their own runs alive;
    /// everything else is invalid after this. Loaded compile-time libraries
    /// are owned by the builder, which the driver drops *after* this.
    pub fn destroy(self) {
        debug!(
            definitions = self.definitions.len(),
            comptime_runs = self.comptime_runs.len(),
            "destroying environment"
        );
        drop(self);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}
