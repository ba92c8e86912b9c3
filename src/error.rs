use std::process::ExitStatus;

use thiserror::Error;

/// Main error type for command execution.
#[derive(Error, Debug)]
pub enum ShrunError {
    /// The command ran to completion but exited with a non-zero code.
    ///
    /// Carries the argv of the command that produced the exit, so callers
    /// can tell which stage of a pipeline failed.
    #[error("command `{}` exited with code {code}", shell_words::join(argv))]
    Exit { code: i32, argv: Vec<String> },

    /// The program could not be located or the OS process could not be
    /// created.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// OS pipe allocation failed before either pipeline process started.
    #[error("failed to open pipe: {0}")]
    Pipe(#[source] nix::Error),

    /// I/O failure while waiting on a process or streaming its output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShrunError {
    /// Whether this error is a non-zero exit (as opposed to a failure to
    /// start, pipe, or stream).
    pub fn is_exit(&self) -> bool {
        matches!(self, ShrunError::Exit { .. })
    }

    /// The exit code for a non-zero exit, or None for any other failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ShrunError::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The argv of the command whose exit produced this error.
    pub fn exit_argv(&self) -> Option<&[String]> {
        match self {
            ShrunError::Exit { argv, .. } => Some(argv),
            _ => None,
        }
    }
}

/// Result type alias for command execution.
pub type Result<T> = std::result::Result<T, ShrunError>;

/// Classify a finished process's status: Ok for exit 0, an Exit error
/// otherwise. Signal termination maps to 128 + signal number, matching
/// shell convention.
pub(crate) fn check_status(status: ExitStatus, argv: &[String]) -> Result<()> {
    use std::os::unix::process::ExitStatusExt;

    if status.success() {
        return Ok(());
    }

    let code = match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    };

    Err(ShrunError::Exit {
        code,
        argv: argv.to_vec(),
    })
}

fn exit_with(err: ShrunError) -> ! {
    match err.exit_code() {
        // The subprocess already printed its own diagnostics; exit
        // silently with the same code.
        Some(code) => std::process::exit(code),
        None => {
            eprintln!("shrun: {}", err);
            std::process::exit(1);
        }
    }
}

/// Exit the current process with a non-zero code if the result is an error.
///
/// An Exit error exits silently with the same code as the command that
/// produced it. Any other error is printed to stderr and exits with code 1.
/// This gives thin entry points a limited "set -e" analogue without its
/// exception rules.
pub fn exit_if_error(result: Result<()>) {
    if let Err(err) = result {
        exit_with(err);
    }
}

/// Return the value after checking the error with [`exit_if_error`].
pub fn get_or_exit<T>(result: Result<T>) -> T {
    result.unwrap_or_else(|err| exit_with(err))
}
