//! Building and loading compile-time artifact libraries.
//!
//! [`DynamicLibraryBuilder`] is the real implementation of
//! [`CompileTimeBuilder`]: write the generated C next to the cache, compile
//! and link it into a shared library, load it, and resolve the procedure
//! symbol. Loaded libraries are retained for the builder's whole lifetime —
//! in-flight function pointers may be on the evaluator's stack, so the
//! driver must drop the builder only after the environment.

use std::ffi::c_void;
use std::fs;
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{debug, info};

use sprig_eval::{
    BuildStage, BuiltProcedure, CompileTimeBuildError, CompileTimeBuilder, GeneratorProcedure,
    HookProcedure, MacroProcedure, ObjectType, RawProcedure,
};
use sprig_output::{convert_name, NameStyleMode};

use crate::cache::ArtifactCache;
use crate::command::{CommandSubstitutions, ProcessCommand};
use crate::runner::run_process;

/// Declarations for the compiler-exported interface the generated code
/// calls. Prepended to every compile-time artifact source.
const COMPTIME_PREAMBLE: &str = "\
#include <stdbool.h>

extern int sprig_get_argument(const void* tokens, int startTokenIndex, int whichArgument);
extern const void* sprig_token_at(const void* tokens, int index);
extern void sprig_tokens_push_symbol(void* expansion, const char* contents, const void* blame);
extern void sprig_tokens_push_open(void* expansion, const void* blame);
extern void sprig_tokens_push_close(void* expansion, const void* blame);
extern void sprig_tokens_push_string(void* expansion, const char* contents, const void* blame);
extern void sprig_tokens_push_expression(void* expansion, const void* tokens, int index);
extern void sprig_add_string_output(void* output, const char* text, unsigned int modifiers, const void* blame);
extern int sprig_evaluate(void* environment, const void* context, const void* tokens, int startTokenIndex, void* output);
extern void sprig_error(const void* token, const char* message);
extern void sprig_link_command_add(void* linkCommand, const char* argument);
extern bool sprig_replace_and_evaluate_definition(void* environment, const char* name, const void* newTokens);

";

/// Prepend the interface declarations to rendered compile-time source.
pub fn render_artifact_source(source_text: &str) -> String {
    let mut text = String::with_capacity(COMPTIME_PREAMBLE.len() + source_text.len());
    text.push_str(COMPTIME_PREAMBLE);
    text.push_str(source_text);
    text
}

/// Replace characters that cannot appear in a filename.
fn sanitize_artifact_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The real build collaborator.
pub struct DynamicLibraryBuilder {
    artifacts_dir: PathBuf,
    compile_command: ProcessCommand,
    link_command: ProcessCommand,
    cache: ArtifactCache,
    /// Loaded libraries, unloaded only when the builder drops.
    libraries: Vec<Library>,
}

impl DynamicLibraryBuilder {
    pub fn new(build_output_dir: &Path) -> DynamicLibraryBuilder {
        let artifacts_dir = build_output_dir.join("comptime");
        DynamicLibraryBuilder {
            cache: ArtifactCache::load(&artifacts_dir),
            artifacts_dir,
            compile_command: ProcessCommand::default_comptime_compile(),
            link_command: ProcessCommand::default_comptime_link(),
            libraries: Vec::new(),
        }
    }

    /// Persist the command cache. Call once after compilation finishes.
    pub fn save_cache(&self) {
        if let Err(error) = self.cache.save() {
            tracing::warn!(%error, "could not save compile-time command cache");
        }
    }

    fn fail(stage: BuildStage, message: impl Into<String>) -> CompileTimeBuildError {
        CompileTimeBuildError {
            stage,
            message: message.into(),
        }
    }
}

impl CompileTimeBuilder for DynamicLibraryBuilder {
    fn build_and_load(
        &mut self,
        name: &str,
        source_text: &str,
        object_type: ObjectType,
        link_arguments: &[String],
    ) -> Result<BuiltProcedure, CompileTimeBuildError> {
        let artifact_name = sanitize_artifact_name(name);
        let source_path = self.artifacts_dir.join(format!("{artifact_name}.c"));
        let object_path = self.artifacts_dir.join(format!("{artifact_name}.o"));
        let library_path = self.artifacts_dir.join(format!("{artifact_name}.so"));

        fs::create_dir_all(&self.artifacts_dir)
            .map_err(|error| Self::fail(BuildStage::Compile, error.to_string()))?;
        let full_source = render_artifact_source(source_text);

        let compile_argv = self.compile_command.resolve(&CommandSubstitutions {
            source_file: Some(&source_path),
            object_file: Some(&object_path),
            ..CommandSubstitutions::default()
        });
        let mut link_argv = self.link_command.resolve(&CommandSubstitutions {
            object_file: Some(&object_path),
            dynamic_library_file: Some(&library_path),
            ..CommandSubstitutions::default()
        });
        link_argv.extend(link_arguments.iter().cloned());

        // The digest covers the commands and the generated source, so edits
        // to either rebuild the artifact.
        let mut combined = compile_argv.clone();
        combined.extend(link_argv.iter().cloned());
        if self
            .cache
            .needs_rebuild(&library_path, &combined, &[&full_source])
        {
            fs::write(&source_path, &full_source)
                .map_err(|error| Self::fail(BuildStage::Compile, error.to_string()))?;
            run_process(&compile_argv, None)
                .map_err(|error| Self::fail(BuildStage::Compile, error.to_string()))?;
            run_process(&link_argv, None)
                .map_err(|error| Self::fail(BuildStage::Link, error.to_string()))?;
            info!(name = %name, library = %library_path.display(), "built compile-time artifact");
        } else {
            debug!(name = %name, "compile-time artifact up to date");
        }

        let library = unsafe { Library::new(&library_path) }
            .map_err(|error| Self::fail(BuildStage::Load, error.to_string()))?;

        // The emitted function name went through the same converter the
        // writer uses for function names.
        let symbol_name = convert_name(name, NameStyleMode::CamelCaseIfLispy);
        let raw = unsafe {
            let symbol = library
                .get::<unsafe extern "C" fn()>(symbol_name.as_bytes())
                .map_err(|error| Self::fail(BuildStage::ResolveSymbol, error.to_string()))?;
            RawProcedure(*symbol as *const c_void)
        };
        self.libraries.push(library);

        Ok(match object_type {
            ObjectType::Macro => BuiltProcedure::Macro(MacroProcedure::Loaded(raw)),
            ObjectType::Generator => BuiltProcedure::Generator(GeneratorProcedure::Loaded(raw)),
            _ => BuiltProcedure::Function(HookProcedure::Loaded(raw)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_source_declares_interface() {
        let text = render_artifact_source("bool square(void* e) { return true; }");
        assert!(text.starts_with("#include <stdbool.h>"));
        assert!(text.contains("extern int sprig_get_argument"));
        assert!(text.ends_with("bool square(void* e) { return true; }"));
    }

    #[test]
    fn test_sanitize_artifact_name() {
        assert_eq!(sanitize_artifact_name("my-macro"), "my-macro");
        assert_eq!(sanitize_artifact_name("odd?name!"), "odd_name_");
    }

    #[test]
    fn test_missing_library_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = DynamicLibraryBuilder::new(dir.path());
        // No C toolchain in the test environment: stub the commands with
        // ones that succeed without producing the library.
        builder.compile_command = ProcessCommand {
            executable: "true".to_string(),
            arguments: Vec::new(),
        };
        builder.link_command = ProcessCommand {
            executable: "true".to_string(),
            arguments: Vec::new(),
        };
        let error = builder
            .build_and_load("ghost", "bool ghost(void* e) { return true; }", ObjectType::Macro, &[])
            .unwrap_err();
        assert_eq!(error.stage, BuildStage::Load);
    }
}
