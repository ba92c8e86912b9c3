//! Run external commands with behavior similar to a command line shell:
//! streams inherited by default, chained env overrides, two-process
//! pipelines with pipefail semantics, command aliases, and "set -x" style
//! debug tracing.
//!
//! ```no_run
//! use shrun::{command, exit_if_error, Context};
//!
//! // Simple invocation against the inherited streams.
//! exit_if_error(command(["go", "build", "./..."]).run());
//!
//! // A context carries defaults, aliases, and an optional debug sink.
//! let context = Context::new().alias("aws", ["aws", "--profile", "prod"]);
//! let digest = context
//!     .command(["cat", "image.tar"])
//!     .pipe(["sha256sum"])
//!     .text();
//! ```

// Platform-specific compilation guard
#[cfg(not(unix))]
compile_error!("shrun requires a Unix-like operating system: pipelines are \
                built on POSIX pipe file descriptors.");

#[cfg(unix)]
pub mod cmd;
#[cfg(unix)]
pub mod context;
#[cfg(unix)]
pub mod error;
#[cfg(unix)]
mod pipeline;
#[cfg(unix)]
mod trace;

#[cfg(unix)]
pub use cmd::Cmd;
#[cfg(unix)]
pub use context::{Context, Input, Output, SharedReader, SharedWriter};
#[cfg(unix)]
pub use error::{exit_if_error, get_or_exit, Result, ShrunError};

/// Initialize a new command against a default context that inherits the
/// current process's streams, with no aliases and no debug sink.
#[cfg(unix)]
pub fn command<I, S>(args: I) -> Cmd
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Context::default().command(args)
}
