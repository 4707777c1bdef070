//! Build collaborator for the Sprig transpiler.
//!
//! Three concerns, kept deliberately separate from the evaluator: command
//! templates ([`ProcessCommand`]), subprocess execution ([`run_process`]),
//! and the command-digest artifact cache ([`ArtifactCache`]). On top of
//! them, [`DynamicLibraryBuilder`] implements the evaluator's
//! `CompileTimeBuilder` interface by compiling generated C into shared
//! libraries and resolving procedure symbols.
//!
//! Drop ordering matters: the builder owns every loaded library, so it must
//! outlive the `Environment` that holds pointers into them.

mod cache;
mod command;
mod loader;
mod runner;

pub use cache::ArtifactCache;
pub use command::{CommandSubstitutions, ProcessCommand, ProcessCommandArgument};
pub use loader::{render_artifact_source, DynamicLibraryBuilder};
pub use runner::{run_process, RunProcessError, RunProcessErrorKind};
