//! Process command templates with substitution slots.
//!
//! Build commands are data, not code: a command mixes literal arguments with
//! slots resolved per artifact. This is what lets `pre-link` hooks append
//! arguments and lets the cache digest the exact command line that would
//! run.

use std::path::Path;

/// One argument of a [`ProcessCommand`]: literal text or a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessCommandArgument {
    Literal(String),
    SourceFile,
    ObjectFile,
    DynamicLibraryFile,
    ExecutableFile,
}

/// Per-invocation values for the substitution slots.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandSubstitutions<'a> {
    pub source_file: Option<&'a Path>,
    pub object_file: Option<&'a Path>,
    pub dynamic_library_file: Option<&'a Path>,
    pub executable_file: Option<&'a Path>,
}

/// A command template: executable plus argument slots.
#[derive(Clone, Debug)]
pub struct ProcessCommand {
    pub executable: String,
    pub arguments: Vec<ProcessCommandArgument>,
}

impl ProcessCommand {
    /// Resolve to the concrete argv (executable first). Unfilled slots
    /// resolve to nothing, which surfaces as a compiler usage error rather
    /// than a silent wrong build.
    pub fn resolve(&self, substitutions: &CommandSubstitutions<'_>) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.arguments.len() + 1);
        argv.push(self.executable.clone());
        for argument in &self.arguments {
            let resolved = match argument {
                ProcessCommandArgument::Literal(text) => Some(text.clone()),
                ProcessCommandArgument::SourceFile => path_string(substitutions.source_file),
                ProcessCommandArgument::ObjectFile => path_string(substitutions.object_file),
                ProcessCommandArgument::DynamicLibraryFile => {
                    path_string(substitutions.dynamic_library_file)
                }
                ProcessCommandArgument::ExecutableFile => {
                    path_string(substitutions.executable_file)
                }
            };
            if let Some(resolved) = resolved {
                argv.push(resolved);
            }
        }
        argv
    }

    fn literal(text: &str) -> ProcessCommandArgument {
        ProcessCommandArgument::Literal(text.to_string())
    }

    /// Default compile command for compile-time artifacts:
    /// `cc -c -fPIC -o <object> <source>`.
    pub fn default_comptime_compile() -> ProcessCommand {
        ProcessCommand {
            executable: "cc".to_string(),
            arguments: vec![
                Self::literal("-c"),
                Self::literal("-fPIC"),
                Self::literal("-o"),
                ProcessCommandArgument::ObjectFile,
                ProcessCommandArgument::SourceFile,
            ],
        }
    }

    /// Default link command for compile-time artifacts:
    /// `cc -shared -o <library> <object>`. Pre-link hook arguments are
    /// appended after resolution.
    pub fn default_comptime_link() -> ProcessCommand {
        ProcessCommand {
            executable: "cc".to_string(),
            arguments: vec![
                Self::literal("-shared"),
                Self::literal("-o"),
                ProcessCommandArgument::DynamicLibraryFile,
                ProcessCommandArgument::ObjectFile,
            ],
        }
    }

    /// Default compile command for generated module sources:
    /// `cc -c -o <object> <source>`.
    pub fn default_build_compile() -> ProcessCommand {
        ProcessCommand {
            executable: "cc".to_string(),
            arguments: vec![
                Self::literal("-c"),
                Self::literal("-o"),
                ProcessCommandArgument::ObjectFile,
                ProcessCommandArgument::SourceFile,
            ],
        }
    }

    /// Default executable link command: `cc -o <executable> <objects...>`.
    /// Objects are appended after resolution, one per module.
    pub fn default_build_link() -> ProcessCommand {
        ProcessCommand {
            executable: "cc".to_string(),
            arguments: vec![
                Self::literal("-o"),
                ProcessCommandArgument::ExecutableFile,
            ],
        }
    }
}

fn path_string(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_substitutes_slots() {
        let command = ProcessCommand::default_comptime_compile();
        let source = PathBuf::from("cache/square.c");
        let object = PathBuf::from("cache/square.o");
        let argv = command.resolve(&CommandSubstitutions {
            source_file: Some(&source),
            object_file: Some(&object),
            ..CommandSubstitutions::default()
        });
        assert_eq!(
            argv,
            vec!["cc", "-c", "-fPIC", "-o", "cache/square.o", "cache/square.c"]
        );
    }

    #[test]
    fn test_unfilled_slot_resolves_to_nothing() {
        let command = ProcessCommand::default_comptime_link();
        let argv = command.resolve(&CommandSubstitutions::default());
        assert_eq!(argv, vec!["cc", "-shared", "-o"]);
    }
}
