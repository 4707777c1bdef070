//! Sprig Compiler CLI
//!
//! Transpiles Sprig modules to C source/header pairs and optionally drives
//! the native build.

use std::path::{Path, PathBuf};

use sprig_build::DynamicLibraryBuilder;
use sprigc::module_manager::ModuleManager;
use sprigc::tracing_setup;

fn main() {
    tracing_setup::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = args[1].as_str();
    match command {
        "build" => run_pipeline(&args[2..], true),
        "evaluate" => run_pipeline(&args[2..], false),
        "tokenize" => {
            if args.len() < 3 {
                eprintln!("Usage: sprigc tokenize <file.spr>");
                std::process::exit(1);
            }
            tokenize_file(Path::new(&args[2]));
        }
        "help" | "--help" | "-h" => print_usage(),
        "version" | "--version" | "-v" => {
            println!("Sprig Compiler 0.1.0");
        }
        _ => {
            // A bare .spr path is shorthand for 'build'.
            if Path::new(command)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("spr"))
            {
                run_pipeline(&args[1..], true);
            } else {
                eprintln!("Unknown command: {command}");
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }
}

/// Evaluate files, resolve references, write outputs, optionally build.
fn run_pipeline(args: &[String], native_build: bool) {
    let mut output_dir = PathBuf::from("sprig_output");
    let mut files: Vec<PathBuf> = Vec::new();
    for arg in args {
        if let Some(dir) = arg.strip_prefix("--output-dir=") {
            output_dir = PathBuf::from(dir);
        } else if arg.starts_with('-') {
            eprintln!("Unknown option: {arg}");
            std::process::exit(1);
        } else {
            files.push(PathBuf::from(arg));
        }
    }
    if files.is_empty() {
        eprintln!("No input files");
        std::process::exit(1);
    }

    // The builder owns loaded compile-time libraries; it must be declared
    // before the manager so it drops after the environment.
    let mut builder = DynamicLibraryBuilder::new(&output_dir);
    let mut manager = ModuleManager::new(&output_dir);

    let mut errors = false;
    for file in &files {
        if !manager.add_evaluate_file(file) {
            errors = true;
        }
    }
    if errors {
        std::process::exit(1);
    }
    if !manager.evaluate_resolve_references(&mut builder) {
        std::process::exit(1);
    }
    builder.save_cache();
    if !manager.write_outputs() {
        std::process::exit(1);
    }
    if native_build {
        let executable = files[0]
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "a.out".to_string());
        if !manager.build(&executable) {
            std::process::exit(1);
        }
    }
}

/// Print one token per line with provenance, for tokenizer debugging.
fn tokenize_file(path: &Path) {
    let filename: std::sync::Arc<str> = std::sync::Arc::from(path.to_string_lossy().as_ref());
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) => {
            eprintln!("{filename}:1:1: error: could not read file: {error}");
            std::process::exit(1);
        }
    };
    let tokens = match sprig_lexer::tokenize_file_contents(&contents, &filename) {
        Ok(tokens) => tokens,
        Err(error) => {
            eprintln!("{}:{}:{}: error: {error}", error.file, error.line, error.column);
            std::process::exit(1);
        }
    };

    let mut depth = 0usize;
    for token in &tokens {
        if token.kind == sprig_lexer::TokenKind::CloseParen {
            depth = depth.saturating_sub(1);
        }
        println!(
            "{:indent$}{:?}\t{}\tline {} cols {}-{}",
            "",
            token.kind,
            token,
            token.source.line,
            token.source.column_start,
            token.source.column_end,
            indent = depth * 2
        );
        if token.kind == sprig_lexer::TokenKind::OpenParen {
            depth += 1;
        }
    }
}

fn print_usage() {
    println!("Sprig Compiler");
    println!();
    println!("Usage: sprigc <command> [options] <files...>");
    println!();
    println!("Commands:");
    println!("  build <files.spr...>     Transpile to C and build natively");
    println!("  evaluate <files.spr...>  Transpile to C without building");
    println!("  tokenize <file.spr>      Print the token stream");
    println!("  help                     Show this help message");
    println!("  version                  Show version information");
    println!();
    println!("Options:");
    println!("  --output-dir=<dir>       Where generated files go (default: sprig_output)");
    println!();
    println!("Environment:");
    println!("  SPRIG_LOG=<filter>       Enable tracing output (RUST_LOG syntax)");
    println!("  SPRIG_LOG_TREE=1         Hierarchical tracing output");
    println!();
    println!("Examples:");
    println!("  sprigc build main.spr");
    println!("  sprigc evaluate --output-dir=gen lib.spr main.spr");
    println!("  sprigc main.spr          # Shorthand for 'build'");
}
