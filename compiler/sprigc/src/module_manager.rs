//! Module coordination: load, evaluate, resolve, write, build.
//!
//! A module is one source file. All modules share one [`Environment`] and a
//! single pseudo-definition that top-level references attach to, so a form
//! at module scope is required by construction. Pipeline order is fixed:
//! every module is read and evaluated before reference resolution runs,
//! then hooks, then output files, then (optionally) the native build.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use sprig_build::{ArtifactCache, CommandSubstitutions, ProcessCommand};
use sprig_diagnostic::{emit_blamed_error, Diagnostic, Severity};
use sprig_eval::{
    evaluate_generate_all_recursive, evaluate_resolve_references, run_pre_link_hooks,
    CompileTimeBuilder, Environment, EvaluatorContext, EvaluatorScope, ObjectDefinition,
    ObjectType,
};
use sprig_lexer::{
    tokenize_file_contents, validate_parentheses, SourceLoc, Token, TokenKind, TokenRun,
};
use sprig_output::{
    write_generator_output, GeneratorOutput, NameStyleSettings, OutputCell, OutputModifiers,
    StringOutput, WriterFormatSettings, WriterOutputSettings,
};

const MODULE_DEFINITION_NAME: &str = "<module>";

/// One evaluated source file and its generated output.
pub struct Module {
    pub filename: Arc<str>,
    pub tokens: TokenRun,
    pub output: GeneratorOutput,
    pub source_output_path: PathBuf,
    pub header_output_path: PathBuf,
    /// Evaluate-only modules (declarations, compile-time code) are excluded
    /// from the native build.
    pub skip_build: bool,
}

/// Owns the environment and the module list for one compilation.
pub struct ModuleManager {
    pub environment: Environment,
    pub modules: Vec<Module>,
    module_pseudo_token: Token,
    build_output_dir: PathBuf,
}

/// Report a file-level problem in the standard diagnostic format, blamed to
/// the top of the file.
fn emit_file_error(filename: &str, message: impl Into<String>) {
    let diagnostic = Diagnostic {
        file: Arc::from(filename),
        line: 1,
        column: 1,
        severity: Severity::Error,
        message: message.into(),
    };
    eprintln!("{diagnostic}");
}

impl ModuleManager {
    pub fn new(build_output_dir: impl Into<PathBuf>) -> ModuleManager {
        let mut environment = Environment::new();

        // The pseudo-definition every top-level reference blames. Required,
        // so module-scope code is always in the required closure.
        let module_pseudo_token = Token {
            kind: TokenKind::Symbol,
            contents: MODULE_DEFINITION_NAME.to_string(),
            source: SourceLoc::generated(Arc::from(MODULE_DEFINITION_NAME)),
        };
        let mut definition = ObjectDefinition::new(
            module_pseudo_token.clone(),
            ObjectType::Function,
            None,
        );
        definition.is_required = true;
        definition.output = Some(OutputCell::new());
        environment.add_object_definition(definition);

        ModuleManager {
            environment,
            modules: Vec::new(),
            module_pseudo_token,
            build_output_dir: build_output_dir.into(),
        }
    }

    /// Read, tokenize, validate, seal, and evaluate one file.
    pub fn add_evaluate_file(&mut self, path: &Path) -> bool {
        let filename: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
        info!(file = %filename, "evaluating module");

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) => {
                emit_file_error(&filename, format!("could not read file: {error}"));
                return false;
            }
        };
        let tokens = match tokenize_file_contents(&contents, &filename) {
            Ok(tokens) => tokens,
            Err(error) => {
                let diagnostic = Diagnostic {
                    file: error.file.clone(),
                    line: error.line,
                    column: error.column,
                    severity: Severity::Error,
                    message: error.to_string(),
                };
                eprintln!("{diagnostic}");
                return false;
            }
        };
        if let Err(error) = validate_parentheses(&tokens) {
            emit_blamed_error(error.blame(), error.to_string());
            return false;
        }
        let tokens = TokenRun::seal(tokens);

        let context = EvaluatorContext {
            scope: EvaluatorScope::Module,
            module: Some(Arc::clone(&filename)),
            definition_name: Some(self.module_pseudo_token.clone()),
            is_required: true,
            delimiter_template: Some(StringOutput::delimiter_template(
                OutputModifiers::NEWLINE_AFTER,
                &self.module_pseudo_token,
            )),
        };
        let mut output = GeneratorOutput::new();
        let errors =
            evaluate_generate_all_recursive(&mut self.environment, &context, &tokens, 0, &mut output);

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());
        self.modules.push(Module {
            filename,
            tokens,
            output,
            source_output_path: self.build_output_dir.join(format!("{stem}.c")),
            header_output_path: self.build_output_dir.join(format!("{stem}.h")),
            skip_build: false,
        });

        debug!(errors, "module evaluated");
        errors == 0
    }

    /// Run reference resolution to a fixed point, including post-resolution
    /// hooks and any re-resolution they force.
    pub fn evaluate_resolve_references(&mut self, builder: &mut dyn CompileTimeBuilder) -> bool {
        evaluate_resolve_references(&mut self.environment, builder)
    }

    /// Render and write each module's source/header pair.
    pub fn write_outputs(&self) -> bool {
        if let Err(error) = fs::create_dir_all(&self.build_output_dir) {
            emit_file_error(
                &self.build_output_dir.to_string_lossy(),
                format!("could not create output directory: {error}"),
            );
            return false;
        }

        let names = NameStyleSettings::default();
        let format = WriterFormatSettings::default();
        for module in &self.modules {
            let header_name = module
                .header_output_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let settings = WriterOutputSettings {
                source_path: module.source_output_path.clone(),
                header_path: module.header_output_path.clone(),
                source_heading: format!("#include \"{header_name}\"\n\n"),
                ..WriterOutputSettings::default()
            };
            if let Err(error) = write_generator_output(&module.output, &names, &format, &settings)
            {
                emit_file_error(&module.filename, error.to_string());
                return false;
            }
            info!(
                source = %module.source_output_path.display(),
                header = %module.header_output_path.display(),
                "wrote module output"
            );
        }
        true
    }

    /// Compile each generated source and link the final executable.
    /// `pre-link` hooks may extend the link command first.
    pub fn build(&mut self, executable_name: &str) -> bool {
        let mut cache = ArtifactCache::load(&self.build_output_dir);
        let compile = ProcessCommand::default_build_compile();

        let mut objects = Vec::new();
        for module in self.modules.iter().filter(|m| !m.skip_build) {
            let object_path = module.source_output_path.with_extension("o");
            let argv = compile.resolve(&CommandSubstitutions {
                source_file: Some(&module.source_output_path),
                object_file: Some(&object_path),
                ..CommandSubstitutions::default()
            });
            if cache.needs_rebuild(&object_path, &argv, &[]) {
                if let Err(error) = sprig_build::run_process(&argv, None) {
                    emit_file_error(&module.filename, error.to_string());
                    return false;
                }
            }
            objects.push(object_path);
        }

        let executable_path = self.build_output_dir.join(executable_name);
        let mut link_argv = ProcessCommand::default_build_link().resolve(&CommandSubstitutions {
            executable_file: Some(&executable_path),
            ..CommandSubstitutions::default()
        });
        for object in &objects {
            link_argv.push(object.to_string_lossy().into_owned());
        }
        if !run_pre_link_hooks(&mut self.environment, &mut link_argv) {
            return false;
        }
        if cache.needs_rebuild(&executable_path, &link_argv, &[]) {
            if let Err(error) = sprig_build::run_process(&link_argv, None) {
                emit_file_error(executable_name, error.to_string());
                return false;
            }
        }
        if let Err(error) = cache.save() {
            tracing::warn!(%error, "could not save build command cache");
        }
        info!(executable = %executable_path.display(), "build complete");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_eval::UnavailableBuilder;

    fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_pipeline_writes_source_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(
            dir.path(),
            "math.spr",
            "(defun add (a int b int &return int) (return (+ a b)))",
        );

        let out_dir = dir.path().join("out");
        let mut manager = ModuleManager::new(&out_dir);
        assert!(manager.add_evaluate_file(&source));
        let mut builder = UnavailableBuilder;
        assert!(manager.evaluate_resolve_references(&mut builder));
        assert!(manager.write_outputs());

        let generated_source = fs::read_to_string(out_dir.join("math.c")).unwrap();
        assert!(generated_source.starts_with("#include \"math.h\"\n"));
        assert!(generated_source.contains("int add(int a, int b)"));
        let generated_header = fs::read_to_string(out_dir.join("math.h")).unwrap();
        assert!(generated_header.starts_with("#pragma once\n"));
        assert!(generated_header.contains("int add(int a, int b);"));
    }

    #[test]
    fn test_cross_module_forward_reference_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let caller = write_source(
            dir.path(),
            "caller.spr",
            "(defun main (&return int) (return (helper)))",
        );
        let callee = write_source(
            dir.path(),
            "callee.spr",
            "(defun helper (&return int) (return 7))",
        );

        let mut manager = ModuleManager::new(dir.path().join("out"));
        assert!(manager.add_evaluate_file(&caller));
        assert!(manager.add_evaluate_file(&callee));
        let mut builder = UnavailableBuilder;
        assert!(manager.evaluate_resolve_references(&mut builder));
        assert!(manager.environment.references.is_empty());
    }

    #[test]
    fn test_evaluation_errors_fail_the_module() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_source(dir.path(), "bad.spr", "(var broken)");
        let mut manager = ModuleManager::new(dir.path().join("out"));
        assert!(!manager.add_evaluate_file(&bad));
    }

    #[test]
    fn test_unbalanced_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_source(dir.path(), "open.spr", "(defun f (");
        let mut manager = ModuleManager::new(dir.path().join("out"));
        assert!(!manager.add_evaluate_file(&bad));
    }
}
