use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use crate::cmd::Cmd;

/// Shared handle to a writer serving as a default output stream or debug
/// sink. Behind a mutex because pipeline stages stream to it from their
/// own copier threads.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Shared handle to a reader serving as a default input stream.
pub type SharedReader = Arc<Mutex<dyn Read + Send>>;

/// Source for a command's standard input.
#[derive(Clone)]
pub enum Input {
    /// Inherit the current process's stdin.
    Inherit,
    /// Attach /dev/null; the command reads immediate EOF.
    Null,
    /// Stream from an in-memory reader.
    Reader(SharedReader),
}

impl Input {
    /// Wrap a reader as an input source.
    pub fn reader<R: Read + Send + 'static>(reader: R) -> Self {
        Input::Reader(Arc::new(Mutex::new(reader)))
    }
}

/// Destination for a command's standard output or error stream.
#[derive(Clone)]
pub enum Output {
    /// Inherit the corresponding stream of the current process.
    Inherit,
    /// Discard the stream.
    Null,
    /// Stream into an in-memory writer.
    Writer(SharedWriter),
}

impl Output {
    /// Wrap a writer as an output destination.
    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        Output::Writer(Arc::new(Mutex::new(writer)))
    }
}

/// Default settings that affect the execution of commands.
///
/// A context is configured once with the builder methods below and treated
/// as read-only afterwards; cloning is cheap (stream handles are shared).
/// Commands built against it resolve their streams, aliases, and debug
/// sink at execution time.
#[derive(Clone)]
pub struct Context {
    pub(crate) stdin: Input,
    pub(crate) stdout: Output,
    pub(crate) stderr: Output,
    pub(crate) aliases: HashMap<String, Vec<String>>,
    pub(crate) debug_sink: Option<SharedWriter>,
}

impl Default for Context {
    /// A context that inherits the current process's streams, with no
    /// aliases and no debug sink.
    fn default() -> Self {
        Self {
            stdin: Input::Inherit,
            stdout: Output::Inherit,
            stderr: Output::Inherit,
            aliases: HashMap::new(),
            debug_sink: None,
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default source for stdin.
    pub fn stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    /// Set the default destination for stdout.
    pub fn stdout(mut self, stdout: Output) -> Self {
        self.stdout = stdout;
        self
    }

    /// Set the default destination for stderr.
    pub fn stderr(mut self, stderr: Output) -> Self {
        self.stderr = stderr;
        self
    }

    /// Define an alias. When a command's first argument matches `name`, it
    /// is replaced with `expansion` at execution time, keeping the
    /// remaining arguments.
    pub fn alias<I, S>(mut self, name: impl Into<String>, expansion: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .insert(name.into(), expansion.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a sink that receives one shell-quoted line per traced
    /// command, approximating "set -x". Commands opt in with
    /// [`Cmd::debug`].
    pub fn debug_sink(mut self, sink: SharedWriter) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    /// Initialize a new command that will run with the provided arguments.
    ///
    /// The first argument names the program. If it matches an alias it is
    /// expanded at execution time; otherwise, if it contains no path
    /// separator, it is resolved with a PATH lookup.
    pub fn command<I, S>(&self, args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cmd::new(self.clone(), args.into_iter().map(Into::into).collect())
    }

    pub(crate) fn resolve_alias(&self, argv: &[String]) -> Vec<String> {
        if let Some(expansion) = argv.first().and_then(|name| self.aliases.get(name)) {
            let mut resolved = expansion.clone();
            resolved.extend(argv[1..].iter().cloned());
            return resolved;
        }
        argv.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_alias_expands_first_argument() {
        let context = Context::new().alias("deploy", ["aws", "--profile", "prod"]);
        let resolved = context.resolve_alias(&argv(&["deploy", "s3", "ls"]));
        assert_eq!(resolved, argv(&["aws", "--profile", "prod", "s3", "ls"]));
    }

    #[test]
    fn test_resolve_alias_passes_through_unaliased() {
        let context = Context::new().alias("deploy", ["aws"]);
        let resolved = context.resolve_alias(&argv(&["echo", "deploy"]));
        assert_eq!(resolved, argv(&["echo", "deploy"]));
    }

    #[test]
    fn test_default_context_has_no_aliases_or_sink() {
        let context = Context::default();
        assert!(context.aliases.is_empty());
        assert!(context.debug_sink.is_none());
    }
}
