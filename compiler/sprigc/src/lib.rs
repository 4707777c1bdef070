//! Sprig compiler driver library.
//!
//! The binary in `main.rs` is a thin argument parser over
//! [`module_manager::ModuleManager`], which runs the pipeline: add/evaluate
//! files → resolve references (building compile-time procedures on demand)
//! → run hooks → write generated C → optionally build natively.

pub mod module_manager;
pub mod tracing_setup;
