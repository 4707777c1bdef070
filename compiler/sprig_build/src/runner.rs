//! Subprocess execution for compile and link commands.
//!
//! The evaluator may block waiting on these; by the concurrency contract
//! this is the only blocking point compile-time code can observe.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

/// A subprocess that could not run or exited nonzero.
#[derive(Debug)]
pub struct RunProcessError {
    pub command_line: String,
    pub kind: RunProcessErrorKind,
}

#[derive(Debug)]
pub enum RunProcessErrorKind {
    Spawn(io::Error),
    ExitedNonzero { code: Option<i32>, stderr: String },
}

impl fmt::Display for RunProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RunProcessErrorKind::Spawn(error) => {
                write!(f, "could not run '{}': {error}", self.command_line)
            }
            RunProcessErrorKind::ExitedNonzero { code, stderr } => {
                let code = code.map_or("signal".to_string(), |c| c.to_string());
                write!(
                    f,
                    "'{}' exited with {code}: {}",
                    self.command_line,
                    stderr.trim_end()
                )
            }
        }
    }
}

impl std::error::Error for RunProcessError {}

/// Run `argv` to completion, capturing stderr. Empty argv is a programmer
/// error surfaced as a spawn failure.
pub fn run_process(argv: &[String], working_dir: Option<&Path>) -> Result<(), RunProcessError> {
    let command_line = argv.join(" ");
    let Some((executable, arguments)) = argv.split_first() else {
        return Err(RunProcessError {
            command_line,
            kind: RunProcessErrorKind::Spawn(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty command",
            )),
        });
    };

    debug!(command = %command_line, "running process");
    let mut command = Command::new(executable);
    command.args(arguments);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    let output = command.output().map_err(|error| RunProcessError {
        command_line: command_line.clone(),
        kind: RunProcessErrorKind::Spawn(error),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        warn!(command = %command_line, %stderr, "process failed");
        return Err(RunProcessError {
            command_line,
            kind: RunProcessErrorKind::ExitedNonzero {
                code: output.status.code(),
                stderr,
            },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_process() {
        assert!(run_process(&["true".to_string()], None).is_ok());
    }

    #[test]
    fn test_failing_process_reports_code() {
        let error = run_process(&["false".to_string()], None).unwrap_err();
        assert!(matches!(
            error.kind,
            RunProcessErrorKind::ExitedNonzero { code: Some(1), .. }
        ));
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let error =
            run_process(&["definitely-not-a-real-compiler".to_string()], None).unwrap_err();
        assert!(matches!(error.kind, RunProcessErrorKind::Spawn(_)));
    }
}
