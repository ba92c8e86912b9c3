use std::sync::{Arc, Mutex};

use crate::context::{Context, Input};
use crate::error::{self, Result};
use crate::pipeline::{self, StdoutDest};
use crate::trace;

/// A runnable command.
///
/// Built against a [`Context`], configured with chained setters in any
/// order, and executed by one of the terminal methods ([`run`](Cmd::run),
/// [`text`](Cmd::text), [`successful`](Cmd::successful)). Terminal methods
/// consume the command, so each `Cmd` executes at most once.
pub struct Cmd {
    pub(crate) context: Context,
    pub(crate) argv: Vec<String>,
    pub(crate) envs: Vec<(String, String)>,
    pub(crate) sibling: Option<Box<Cmd>>,
    pub(crate) stdin: Option<Input>,
    pub(crate) no_stdout: bool,
    pub(crate) no_stderr: bool,
    pub(crate) debug: bool,
    exit_on_error: bool,
}

impl Cmd {
    pub(crate) fn new(context: Context, argv: Vec<String>) -> Self {
        Self {
            context,
            argv,
            envs: Vec::new(),
            sibling: None,
            stdin: None,
            no_stdout: false,
            no_stderr: false,
            debug: false,
            exit_on_error: false,
        }
    }

    /// Chain a new command whose stdin is fed by this command's stdout.
    ///
    /// Returns the downstream command; call a terminal method on it to run
    /// the whole pipeline. The downstream command shares the context but
    /// starts with fresh configuration: env overrides, suppression, and
    /// the debug flag do not carry over between stages.
    pub fn pipe<I, S>(self, args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut downstream = self.context.command(args);
        downstream.sibling = Some(Box::new(self));
        downstream
    }

    /// Append an environment override. A later override for the same name
    /// wins over earlier ones and over the inherited value.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((name.into(), value.into()));
        self
    }

    /// Override this command's stdin, rather than using the context's
    /// default. Ignored when an upstream command feeds this one.
    pub fn stdin(mut self, input: Input) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Trace this command to the context's debug sink before it runs.
    /// Pipeline stages opt in individually.
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Suppress forwarding of stdout to the context default. Has no effect
    /// on a stream a terminal method redirects, such as [`text`](Cmd::text)
    /// capture or pipe wiring.
    pub fn no_stdout(mut self) -> Self {
        self.no_stdout = true;
        self
    }

    /// Suppress forwarding of stderr to the context default.
    pub fn no_stderr(mut self) -> Self {
        self.no_stderr = true;
        self
    }

    /// Suppress forwarding of both stdout and stderr.
    pub fn no_output(self) -> Self {
        self.no_stdout().no_stderr()
    }

    /// Exit the current process instead of returning an error from a
    /// terminal method, with the policy of [`exit_if_error`](error::exit_if_error).
    pub fn exit_on_error(mut self) -> Self {
        self.exit_on_error = true;
        self
    }

    /// Run the command and wait for it to complete. Ok exactly when every
    /// pipeline stage exited 0.
    pub fn run(self) -> Result<()> {
        let exit_on_error = self.exit_on_error;
        self.emit_traces();
        let result = pipeline::execute(self, StdoutDest::Configured);
        if exit_on_error {
            error::exit_if_error(result);
            return Ok(());
        }
        result
    }

    /// Run the command, wait for it to complete, and return its stdout
    /// with leading and trailing whitespace trimmed.
    ///
    /// Capture overrides both the context's stdout and any suppression;
    /// output goes exclusively to an in-memory buffer.
    pub fn text(self) -> Result<String> {
        let exit_on_error = self.exit_on_error;
        self.emit_traces();
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let result = pipeline::execute(self, StdoutDest::Capture(buffer.clone()));
        if exit_on_error {
            error::exit_if_error(result);
        } else {
            result?;
        }
        let captured = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(String::from_utf8_lossy(&captured).trim().to_string())
    }

    /// Run the command, wait for it to complete, and return whether it
    /// exited with status 0. Returns an error only if a process could not
    /// start, not for a non-zero exit.
    pub fn successful(mut self) -> Result<bool> {
        // Lift the flag off before delegating: a non-zero exit classifies
        // as Ok(false) here, and must not exit the process.
        let exit_on_error = std::mem::take(&mut self.exit_on_error);
        let result = match self.run() {
            Ok(()) => Ok(true),
            Err(err) if err.is_exit() => Ok(false),
            Err(err) => Err(err),
        };
        if exit_on_error {
            return Ok(error::get_or_exit(result));
        }
        result
    }

    /// Emit debug lines for the whole chain, upstream first, before any
    /// process starts. Doing this ahead of the concurrent starts is what
    /// keeps the lines in left-to-right shell reading order.
    fn emit_traces(&self) {
        if let Some(upstream) = &self.sibling {
            upstream.emit_traces();
        }
        if !self.debug {
            return;
        }
        if let Some(sink) = &self.context.debug_sink {
            let argv = self.context.resolve_alias(&self.argv);
            trace::emit(sink, &trace::render_line(&self.envs, &argv));
        }
    }
}
