use std::sync::Arc;

use sprig_lexer::{
    tokenize_file_contents, validate_parentheses, SourceLoc, Token, TokenKind, TokenRun,
};
use sprig_output::{
    render_stream, GeneratorOutput, NameStyleSettings, OutputCell, OutputModifiers, StreamKind,
    StringOutput, WriterFormatSettings,
};

use crate::helpers::{find_close_paren_token_index, get_argument, push_back_token_expression};
use crate::*;

const MODULE_NAME: &str = "<module>";

fn lex_run(source: &str, file: &Arc<str>) -> TokenRun {
    let tokens = tokenize_file_contents(source, file).expect("test source must lex");
    validate_parentheses(&tokens).expect("test source must balance");
    TokenRun::seal(tokens)
}

fn module_pseudo_token(file: &Arc<str>) -> Token {
    Token {
        kind: TokenKind::Symbol,
        contents: MODULE_NAME.to_string(),
        source: SourceLoc::generated(Arc::clone(file)),
    }
}

/// Evaluate one module's source the way the module manager does: a required
/// pseudo-definition for top-level references, newline delimiters between
/// top-level statements.
fn evaluate_module(
    environment: &mut Environment,
    source: &str,
    file: &str,
) -> (GeneratorOutput, u32) {
    let file: Arc<str> = Arc::from(file);
    let run = lex_run(source, &file);
    let module_token = module_pseudo_token(&file);

    if environment.find_definition(MODULE_NAME).is_none() {
        let mut definition = ObjectDefinition::new(
            module_token.clone(),
            ObjectType::Function,
            Some(Arc::clone(&file)),
        );
        definition.is_required = true;
        definition.output = Some(OutputCell::new());
        assert!(environment.add_object_definition(definition));
    }

    let context = EvaluatorContext {
        scope: EvaluatorScope::Module,
        module: Some(file),
        definition_name: Some(module_token.clone()),
        is_required: true,
        delimiter_template: Some(StringOutput::delimiter_template(
            OutputModifiers::NEWLINE_AFTER,
            &module_token,
        )),
    };
    let mut output = GeneratorOutput::new();
    let errors = evaluate_generate_all_recursive(environment, &context, &run, 0, &mut output);
    (output, errors)
}

fn rendered(output: &GeneratorOutput, kind: StreamKind) -> String {
    render_stream(
        output,
        kind,
        &NameStyleSettings::default(),
        &WriterFormatSettings::default(),
    )
}

/// Collapse whitespace so tests assert on token sequences, not indentation.
fn normalized(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `(square x)` → `(* x x)`, the canonical native test macro.
fn square_macro(
    _environment: &mut Environment,
    _context: &EvaluatorContext,
    tokens: &TokenRun,
    start: usize,
    expansion: &mut Vec<Token>,
) -> bool {
    let end = find_close_paren_token_index(tokens, start);
    let head = &tokens[start + 1];
    let Some(argument) = get_argument(tokens, start, 1, end) else {
        return false;
    };
    let mut open = Token::synthesized_symbol("", head);
    open.kind = TokenKind::OpenParen;
    let mut close = open.clone();
    close.kind = TokenKind::CloseParen;

    expansion.push(open);
    expansion.push(Token::synthesized_symbol("*", head));
    push_back_token_expression(expansion, tokens, argument);
    push_back_token_expression(expansion, tokens, argument);
    expansion.push(close);
    true
}

/// Test double for the build collaborator: installs native procedures and
/// records what it was asked to build.
struct StubBuilder {
    built: Vec<String>,
    fail_all: bool,
}

impl StubBuilder {
    fn new() -> StubBuilder {
        StubBuilder {
            built: Vec::new(),
            fail_all: false,
        }
    }
}

fn stub_hook(_environment: &mut Environment) -> bool {
    true
}

impl CompileTimeBuilder for StubBuilder {
    fn build_and_load(
        &mut self,
        name: &str,
        source_text: &str,
        object_type: ObjectType,
        _link_arguments: &[String],
    ) -> Result<BuiltProcedure, CompileTimeBuildError> {
        if self.fail_all {
            return Err(CompileTimeBuildError {
                stage: BuildStage::Compile,
                message: "stub failure".to_string(),
            });
        }
        assert!(
            !source_text.is_empty(),
            "compile-time definitions must render source text"
        );
        self.built.push(name.to_string());
        Ok(match object_type {
            ObjectType::Macro => BuiltProcedure::Macro(MacroProcedure::Native(square_macro)),
            ObjectType::Generator => {
                BuiltProcedure::Generator(GeneratorProcedure::Native(|_, _, _, _, _| true))
            }
            _ => BuiltProcedure::Function(HookProcedure::NativePostResolve(stub_hook)),
        })
    }
}

// E1: a function definition generates a C definition and a prototype.
#[test]
fn test_defun_generates_source_and_header() {
    let mut environment = Environment::new();
    let (output, errors) = evaluate_module(
        &mut environment,
        "(defun add (a int b int &return int) (return (+ a b)))",
        "add.spr",
    );
    assert_eq!(errors, 0);
    assert_eq!(
        normalized(&rendered(&output, StreamKind::Source)),
        "int add(int a, int b) { return (a + b); }"
    );
    assert_eq!(
        normalized(&rendered(&output, StreamKind::Header)),
        "int add(int a, int b);"
    );
    let definition = environment.find_definition("add").expect("add defined");
    assert_eq!(definition.object_type, ObjectType::Function);
    assert!(definition.is_required);
}

#[test]
fn test_defun_local_is_static_and_header_free() {
    let mut environment = Environment::new();
    let (output, errors) = evaluate_module(
        &mut environment,
        "(defun-local helper (x int &return int) (return x))",
        "helper.spr",
    );
    assert_eq!(errors, 0);
    assert_eq!(
        normalized(&rendered(&output, StreamKind::Source)),
        "static int helper(int x) { return x; }"
    );
    assert_eq!(rendered(&output, StreamKind::Header), "");
}

#[test]
fn test_unknown_invocation_emits_call_and_reference() {
    let mut environment = Environment::new();
    let (output, errors) = evaluate_module(
        &mut environment,
        "(defun main (&return int) (print-thing 1 2) (return 0))",
        "main.spr",
    );
    assert_eq!(errors, 0);
    let source = normalized(&rendered(&output, StreamKind::Source));
    assert!(source.contains("printThing(1, 2);"), "got: {source}");
    let pool = environment
        .references
        .get("print-thing")
        .expect("reference recorded");
    assert_eq!(pool.references.len(), 1);
    assert!(pool.references[0].is_required);
    assert_eq!(pool.references[0].definition_name.as_deref(), Some("main"));
}

// E2: an unresolved required reference is exactly one unknown-symbol error;
// unrequired references are pruned silently.
#[test]
fn test_resolver_reports_missing_required_symbol() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defun main (&return int) (return (foo)) )",
        "main.spr",
    );
    assert_eq!(errors, 0);
    let mut builder = StubBuilder::new();
    assert!(!resolve_references(&mut environment, &mut builder));
    // The pool survives for diagnosis; exactly one name is unresolved.
    assert_eq!(environment.reference_order, vec!["foo".to_string()]);
}

#[test]
fn test_resolver_prunes_unrequired_references() {
    let mut environment = Environment::new();
    // A reference whose blaming definition is not required never becomes an
    // unknown-symbol error.
    let file: Arc<str> = Arc::from("quiet.spr");
    let run = lex_run("(maybe-later)", &file);
    let blame = run[1].clone();
    let context = EvaluatorContext {
        scope: EvaluatorScope::Body,
        module: Some(file),
        definition_name: None,
        is_required: false,
        delimiter_template: None,
    };
    environment.add_reference(Reference {
        definition_name: None,
        token: blame,
        tokens: run.clone(),
        start: 0,
        context,
        splice: OutputCell::new(),
        is_required: false,
    });

    let mut builder = StubBuilder::new();
    assert!(resolve_references(&mut environment, &mut builder));
}

// E3: macro expansion in place, expansion tokens owned by the environment.
#[test]
fn test_macro_expands_in_expression_position() {
    let mut environment = Environment::new();
    environment.register_macro("square", MacroProcedure::Native(square_macro));
    let (output, errors) = evaluate_module(
        &mut environment,
        "(defun f (&return int) (return (square 3)))",
        "f.spr",
    );
    assert_eq!(errors, 0);
    let source = normalized(&rendered(&output, StreamKind::Source));
    assert!(source.contains("return (3 * 3);"), "got: {source}");

    // The expansion outlives the invocation, owned by the environment.
    assert_eq!(environment.comptime_runs.len(), 1);
    let expansion = &environment.comptime_runs[0];
    let spelled: Vec<&str> = expansion
        .iter()
        .map(|token| token.contents.as_str())
        .collect();
    assert_eq!(spelled, vec!["", "*", "3", "3", ""]);

    // And it is recorded on the defining function for expanded copies.
    let definition = environment.find_definition("f").expect("f defined");
    assert_eq!(definition.macro_expansions.len(), 1);
}

// Property 4: macro expansion is identical across fresh environments.
#[test]
fn test_macro_expansion_idempotent_across_environments() {
    let expand = || {
        let mut environment = Environment::new();
        environment.register_macro("square", MacroProcedure::Native(square_macro));
        let (_, errors) = evaluate_module(
            &mut environment,
            "(defun f (&return int) (return (square (+ 1 2))))",
            "f.spr",
        );
        assert_eq!(errors, 0);
        environment.comptime_runs[0]
            .iter()
            .map(|token| (token.kind, token.contents.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(expand(), expand());
}

#[test]
fn test_defmacro_builds_and_reevaluates_reference() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defmacro square (x)
           (tokenize-push output (* (tok-splice x) (tok-splice x)))
           (return true))
         (defun f (&return int) (return (square 3)))",
        "m.spr",
    );
    assert_eq!(errors, 0);

    // Before resolution the use site is a provisional C call.
    let definition = environment.find_definition("square").expect("defined");
    assert_eq!(definition.object_type, ObjectType::Macro);
    assert_eq!(definition.compile_time_state, CompileTimeState::Pending);

    let mut builder = StubBuilder::new();
    assert!(resolve_references(&mut environment, &mut builder));
    assert_eq!(builder.built, vec!["square".to_string()]);
    assert_eq!(
        environment
            .find_definition("square")
            .map(|d| d.compile_time_state),
        Some(CompileTimeState::Built)
    );

    // The reference was re-evaluated through the (stub) macro: the splice
    // now holds the expansion, not the guessed call.
    let function = environment.find_definition("f").expect("f defined");
    let cell = function.output.clone().expect("output");
    let source = normalized(&rendered(&cell.borrow(), StreamKind::Source));
    assert!(source.contains("return (3 * 3);"), "got: {source}");
}

#[test]
fn test_defmacro_emits_interface_calls() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defmacro twice (x)
           (tokenize-push output ((tok-splice x) (tok-splice x)))
           (return true))",
        "m.spr",
    );
    assert_eq!(errors, 0);
    let definition = environment.find_definition("twice").expect("defined");
    let cell = definition.output.clone().expect("comptime output");
    let source = rendered(&cell.borrow(), StreamKind::Source);
    assert!(source.contains("bool twice(void* environment"), "got: {source}");
    assert!(source.contains("int x = sprig_get_argument(tokens, startTokenIndex, 1);"));
    assert!(source.contains("sprig_tokens_push_expression(output, tokens, x);"));
    assert!(source.contains("return true;"));
}

// E5: mutually referencing definitions resolve in one fixed-point run.
#[test]
fn test_mutual_references_resolve() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defun a (&return int) (return (b)))
         (defun b (&return int) (return (a)))",
        "mutual.spr",
    );
    assert_eq!(errors, 0);
    let mut builder = StubBuilder::new();
    assert!(resolve_references(&mut environment, &mut builder));
    assert!(environment.references.is_empty());
    assert!(environment.find_definition("a").is_some_and(|d| d.is_required));
    assert!(environment.find_definition("b").is_some_and(|d| d.is_required));
}

// Property 2: the required set only grows.
#[test]
fn test_required_is_monotonic_across_passes() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defun a (&return int) (return (b)))
         (defun b (&return int) (return 0))",
        "mono.spr",
    );
    assert_eq!(errors, 0);
    let mut builder = StubBuilder::new();
    assert!(resolve_references(&mut environment, &mut builder));
    assert!(environment.find_definition("b").is_some_and(|d| d.is_required));
    // A second pass cannot un-require anything.
    assert!(resolve_references(&mut environment, &mut builder));
    assert!(environment.find_definition("b").is_some_and(|d| d.is_required));
}

// E4: a post-resolution hook rewrites every variable through
// replace_and_evaluate_definition; a second resolver pass terminates.
fn wrap_variable_initializers_hook(environment: &mut Environment) -> bool {
    let variables: Vec<String> = environment
        .definitions
        .iter()
        .filter(|(_, definition)| definition.object_type == ObjectType::Variable)
        .map(|(name, _)| name.clone())
        .collect();

    for name in variables {
        let Some(definition) = environment.find_definition(&name) else {
            return false;
        };
        let mut copied = Vec::new();
        if !crate::helpers::create_definition_copy_macro_expanded(definition, &mut copied) {
            return false;
        }
        // Idempotence is the hook's job: skip variables already wrapped.
        if copied
            .iter()
            .any(|token| token.contents == "deref")
        {
            continue;
        }

        // (var name type init) → (var name type (deref (addr init)))
        let close = copied.pop().expect("copied form is balanced");
        let initializer = copied.split_off(3 + 1); // open, var, name, type
        let blame = copied[1].clone();
        let mut open = blame.clone();
        open.kind = TokenKind::OpenParen;
        open.contents.clear();
        let mut closer = open.clone();
        closer.kind = TokenKind::CloseParen;

        copied.push(open.clone());
        copied.push(Token::synthesized_symbol("deref", &blame));
        copied.push(open.clone());
        copied.push(Token::synthesized_symbol("addr", &blame));
        copied.extend(initializer);
        copied.push(closer.clone());
        copied.push(closer.clone());
        copied.push(close);

        let run = environment.add_comptime_run(copied);
        if !replace_and_evaluate_definition(environment, &name, &run) {
            return false;
        }
    }
    true
}

#[test]
fn test_hook_rewrites_variables_and_resolution_settles() {
    let mut environment = Environment::new();
    let (output, errors) = evaluate_module(
        &mut environment,
        "(var counter int 0)
         (var flag int 1)",
        "vars.spr",
    );
    assert_eq!(errors, 0);

    let hook_blame = module_pseudo_token(&Arc::from("vars.spr"));
    environment.comptime_functions.insert(
        "wrap-vars".to_string(),
        HookProcedure::NativePostResolve(wrap_variable_initializers_hook),
    );
    environment.hooks.push(HookRequest {
        phase: HookPhase::PostReferencesResolved,
        function_name: "wrap-vars".to_string(),
        blame: hook_blame,
    });

    let mut builder = StubBuilder::new();
    assert!(evaluate_resolve_references(&mut environment, &mut builder));

    // The module output references the rewritten cells through the original
    // splices: every variable now initializes through a dereference.
    let source = normalized(&rendered(&output, StreamKind::Source));
    assert!(source.contains("int counter = *(&(0));"), "got: {source}");
    assert!(source.contains("int flag = *(&(1));"), "got: {source}");
}

#[test]
fn test_replace_and_evaluate_keeps_identity_and_requeues_references() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(&mut environment, "(var x int 0)", "x.spr", );
    assert_eq!(errors, 0);
    let original_cell = environment
        .find_definition("x")
        .and_then(|d| d.output.clone())
        .expect("cell");

    let file: Arc<str> = Arc::from("rewrite.spr");
    let run = lex_run("(var x int (initial-value))", &file);
    let owned = environment.add_comptime_run(run.to_vec());
    assert!(replace_and_evaluate_definition(&mut environment, "x", &owned));
    assert!(environment.was_code_modified);

    // Identity preserved: same cell, new content.
    let cell = environment
        .find_definition("x")
        .and_then(|d| d.output.clone())
        .expect("cell");
    assert!(cell.same_cell(&original_cell));
    let source = normalized(&rendered(&cell.borrow(), StreamKind::Source));
    assert!(source.contains("int x = initialValue();"), "got: {source}");

    // The new reference was re-queued for the next resolution pass.
    assert!(environment.references.contains_key("initial-value"));
}

// E6: signature mismatch is rejected; later definitions are unaffected.
#[test]
fn test_hook_signature_mismatch_rejected() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defun-comptime bad-hook (wrong int &return bool) (return true))
         (add-compile-time-hook post-references-resolved bad-hook)
         (defun unaffected (&return int) (return 0))",
        "hooks.spr",
    );
    assert_eq!(errors, 0, "evaluation proceeds past the future mismatch");

    let mut builder = StubBuilder::new();
    assert!(!resolve_references(&mut environment, &mut builder));
    assert!(builder.built.is_empty(), "mismatched hook must not build");
    assert_eq!(
        environment
            .find_definition("bad-hook")
            .map(|d| d.compile_time_state),
        Some(CompileTimeState::Failed)
    );
    assert!(environment.find_definition("unaffected").is_some());
}

#[test]
fn test_hook_signature_match_builds() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defun-comptime good-hook (environment (ref EvaluatorEnvironment) &return bool)
           (return true))
         (add-compile-time-hook post-references-resolved good-hook)",
        "hooks.spr",
    );
    assert_eq!(errors, 0);
    let mut builder = StubBuilder::new();
    assert!(evaluate_resolve_references(&mut environment, &mut builder));
    assert_eq!(builder.built, vec!["good-hook".to_string()]);
}

#[test]
fn test_unknown_hook_phase_rejected() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(add-compile-time-hook post-linker-magic my-hook)",
        "hooks.spr",
    );
    assert_eq!(errors, 1);
    assert!(environment.hooks.is_empty());
}

#[test]
fn test_failed_required_build_is_error_and_reported_once() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defmacro broken (x) (return false))
         (defun f (&return int) (return (broken 1)))",
        "broken.spr",
    );
    assert_eq!(errors, 0);
    let mut builder = StubBuilder::new();
    builder.fail_all = true;
    assert!(!resolve_references(&mut environment, &mut builder));
    assert_eq!(
        environment
            .find_definition("broken")
            .map(|d| d.compile_time_state),
        Some(CompileTimeState::Failed)
    );
    // The name still counts as defined: the pool is dropped, so the failure
    // is not additionally reported as an unknown symbol.
    assert!(!environment.references.contains_key("broken"));
}

// Error recovery: one bad sibling does not stop the pass.
#[test]
fn test_errors_accumulate_and_evaluation_continues() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(var bad)
         (defun still-here (&return int) (return 0))",
        "recover.spr",
    );
    assert_eq!(errors, 1);
    assert!(environment.find_definition("still-here").is_some());
}

#[test]
fn test_var_forbidden_in_expression_scope() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defun f (&return int) (return (var x int)))",
        "scope.spr",
    );
    assert_eq!(errors, 1);
}

#[test]
fn test_duplicate_definition_is_error() {
    let mut environment = Environment::new();
    let (_, errors) = evaluate_module(
        &mut environment,
        "(var x int 1)
         (var x int 2)",
        "dup.spr",
    );
    assert_eq!(errors, 1);
}

#[test]
fn test_c_import_streams() {
    let mut environment = Environment::new();
    let (output, errors) = evaluate_module(
        &mut environment,
        "(c-import \"<stdio.h>\" &with-decls \"api.h\")",
        "imports.spr",
    );
    assert_eq!(errors, 0);
    assert!(rendered(&output, StreamKind::Source).contains("#include <stdio.h>"));
    assert!(rendered(&output, StreamKind::Header).contains("#include \"api.h\""));
}

#[test]
fn test_control_flow_statements_render() {
    let mut environment = Environment::new();
    let (output, errors) = evaluate_module(
        &mut environment,
        "(defun count (limit int &return int)
           (var total int 0)
           (while (< total limit)
             (set total (+ total 1)))
           (if (= total 0)
             (return 1)
             (return total)))",
        "control.spr",
    );
    assert_eq!(errors, 0);
    let source = normalized(&rendered(&output, StreamKind::Source));
    assert!(source.contains("int total = 0;"), "got: {source}");
    assert!(source.contains("while ((total < limit)) { total = (total + 1); }"), "got: {source}");
    assert!(source.contains("if ((total == 0)) { return 1; }"), "got: {source}");
    assert!(source.contains("else { return total; }"), "got: {source}");
}

#[test]
fn test_array_and_pointer_types() {
    let mut environment = Environment::new();
    let (output, errors) = evaluate_module(
        &mut environment,
        "(var buffer ([] 16 int))
         (var cursor (* int))",
        "types.spr",
    );
    assert_eq!(errors, 0);
    let source = normalized(&rendered(&output, StreamKind::Source));
    assert!(source.contains("int buffer[16];"), "got: {source}");
    assert!(source.contains("int* cursor;"), "got: {source}");
}

// Property 1: token runs stay valid for as long as anyone holds a cursor,
// even across environment teardown.
#[test]
fn test_token_run_stability_across_teardown() {
    let mut environment = Environment::new();
    environment.register_macro("square", MacroProcedure::Native(square_macro));
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defun f (&return int) (return (square 7)))",
        "stable.spr",
    );
    assert_eq!(errors, 0);

    let expansion = environment.comptime_runs[0].clone();
    environment.destroy();
    // The cursor's clone keeps the sealed storage alive.
    assert_eq!(expansion[1].contents, "*");
    assert_eq!(expansion[2].contents, "7");
}

#[test]
fn test_gensym_unstable_counter_and_context_stable_names() {
    let mut environment = Environment::new();
    let file: Arc<str> = Arc::from("g.spr");
    let blame = module_pseudo_token(&file);

    let first = environment.make_unique_symbol_name("temp", &blame);
    let second = environment.make_unique_symbol_name("temp", &blame);
    assert_ne!(first.contents, second.contents);

    let context = EvaluatorContext {
        scope: EvaluatorScope::Body,
        module: Some(file.clone()),
        definition_name: Some(Token::synthesized_symbol("my-func", &blame)),
        is_required: true,
        delimiter_template: None,
    };
    let a = environment.make_context_unique_symbol_name(&context, "temp", &blame);

    // A fresh environment with the same context yields the same name.
    let mut other = Environment::new();
    let b = other.make_context_unique_symbol_name(&context, "temp", &blame);
    assert_eq!(a.contents, b.contents);
}

#[test]
fn test_create_definition_copy_expands_macros() {
    let mut environment = Environment::new();
    environment.register_macro("square", MacroProcedure::Native(square_macro));
    let (_, errors) = evaluate_module(
        &mut environment,
        "(defun f (&return int) (return (square 3)))",
        "copy.spr",
    );
    assert_eq!(errors, 0);

    let definition = environment.find_definition("f").expect("f defined");
    let mut copied = Vec::new();
    assert!(crate::helpers::create_definition_copy_macro_expanded(
        definition, &mut copied
    ));
    let spelled: Vec<&str> = copied.iter().map(|t| t.contents.as_str()).collect();
    // (defun f (&return int) (return (* 3 3)))
    assert!(spelled.windows(3).any(|w| w == ["*", "3", "3"]), "got: {spelled:?}");
    assert!(!spelled.contains(&"square"));
}
