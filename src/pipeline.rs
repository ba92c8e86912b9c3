use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::process::{ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::pipe;

use crate::cmd::Cmd;
use crate::context::{Input, Output, SharedReader, SharedWriter};
use crate::error::{check_status, Result, ShrunError};

/// Where a command's stdout goes for one execution.
pub(crate) enum StdoutDest {
    /// Context default, subject to the command's suppression flag.
    Configured,
    /// Exclusive in-memory capture; overrides default and suppression.
    Capture(SharedWriter),
    /// Write end of the pipe feeding a downstream command.
    Pipe(OwnedFd),
}

enum StdinSource {
    /// Command override or context default.
    Configured,
    /// Read end of the pipe fed by an upstream command.
    Pipe(OwnedFd),
}

/// Run a command, including any upstream siblings feeding it through a
/// pipe, and merge the results with pipefail semantics.
///
/// The sibling runs on its own thread, recursively applying this same
/// algorithm; its single result arrives through the thread's join handle.
/// The sibling is always joined before returning, even when the primary
/// fails to start, so no background work outlives the call.
pub(crate) fn execute(mut cmd: Cmd, stdout: StdoutDest) -> Result<()> {
    let sibling = cmd.sibling.take();

    let (stdin, sibling_task) = match sibling {
        Some(upstream) => {
            let (read_end, write_end) = open_pipe()?;
            let task = thread::spawn(move || execute(*upstream, StdoutDest::Pipe(write_end)));
            (StdinSource::Pipe(read_end), Some(task))
        }
        None => (StdinSource::Configured, None),
    };

    let primary = run_single(cmd, stdin, stdout);
    let upstream = join_sibling(sibling_task);

    match (primary, upstream) {
        // The primary's failure wins, including failure to start.
        (Err(err), _) => Err(err),
        // Pipefail: an upstream failure fails the pipeline even though the
        // primary exited 0 after reading a truncated stream.
        (Ok(()), Err(err)) => Err(err),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Allocate the pipe joining two stages, close-on-exec on both ends.
///
/// Spawning dup2s the intended end onto the child's stdio; close-on-exec
/// keeps the stray other end from leaking into a child, where an open
/// write end would hold off EOF indefinitely.
fn open_pipe() -> Result<(OwnedFd, OwnedFd)> {
    use std::os::fd::AsRawFd;

    let (read_end, write_end) = pipe().map_err(ShrunError::Pipe)?;
    for fd in [&read_end, &write_end] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(ShrunError::Pipe)?;
    }
    Ok((read_end, write_end))
}

fn join_sibling(task: Option<JoinHandle<Result<()>>>) -> Result<()> {
    match task {
        None => Ok(()),
        Some(task) => task.join().unwrap_or_else(|_| {
            Err(ShrunError::Io(io::Error::new(
                io::ErrorKind::Other,
                "pipeline stage thread panicked",
            )))
        }),
    }
}

/// Spawn one process with its streams wired, wait for it, and classify
/// the outcome.
fn run_single(cmd: Cmd, stdin: StdinSource, stdout: StdoutDest) -> Result<()> {
    let argv = cmd.context.resolve_alias(&cmd.argv);
    let program = argv.first().cloned().ok_or_else(|| ShrunError::Spawn {
        program: String::new(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
    })?;

    let mut command = Command::new(&program);
    command.args(&argv[1..]);
    for (name, value) in &cmd.envs {
        // Later overrides win for a repeated name.
        command.env(name, value);
    }

    let mut stdin_reader: Option<SharedReader> = None;
    match stdin {
        StdinSource::Pipe(fd) => {
            command.stdin(Stdio::from(fd));
        }
        StdinSource::Configured => {
            let input = cmd.stdin.unwrap_or_else(|| cmd.context.stdin.clone());
            match input {
                Input::Inherit => {
                    command.stdin(Stdio::inherit());
                }
                Input::Null => {
                    command.stdin(Stdio::null());
                }
                Input::Reader(reader) => {
                    command.stdin(Stdio::piped());
                    stdin_reader = Some(reader);
                }
            }
        }
    }

    let mut stdout_writer: Option<SharedWriter> = None;
    match stdout {
        StdoutDest::Pipe(fd) => {
            command.stdout(Stdio::from(fd));
        }
        StdoutDest::Capture(writer) => {
            command.stdout(Stdio::piped());
            stdout_writer = Some(writer);
        }
        StdoutDest::Configured => {
            if cmd.no_stdout {
                command.stdout(Stdio::null());
            } else {
                match cmd.context.stdout.clone() {
                    Output::Inherit => {
                        command.stdout(Stdio::inherit());
                    }
                    Output::Null => {
                        command.stdout(Stdio::null());
                    }
                    Output::Writer(writer) => {
                        command.stdout(Stdio::piped());
                        stdout_writer = Some(writer);
                    }
                }
            }
        }
    }

    let mut stderr_writer: Option<SharedWriter> = None;
    if cmd.no_stderr {
        command.stderr(Stdio::null());
    } else {
        match cmd.context.stderr.clone() {
            Output::Inherit => {
                command.stderr(Stdio::inherit());
            }
            Output::Null => {
                command.stderr(Stdio::null());
            }
            Output::Writer(writer) => {
                command.stderr(Stdio::piped());
                stderr_writer = Some(writer);
            }
        }
    }

    let mut child = command.spawn().map_err(|source| ShrunError::Spawn {
        program: program.clone(),
        source,
    })?;
    // The Command still holds our end of any pipe fd wired above; drop it
    // so the downstream reader sees EOF once this child exits.
    drop(command);

    let mut copiers: Vec<JoinHandle<io::Result<()>>> = Vec::new();

    if let Some(reader) = stdin_reader {
        if let Some(child_stdin) = child.stdin.take() {
            copiers.push(thread::spawn(move || feed_stdin(reader, child_stdin)));
        }
    }
    if let Some(writer) = stdout_writer {
        if let Some(child_stdout) = child.stdout.take() {
            copiers.push(thread::spawn(move || forward_output(child_stdout, writer)));
        }
    }
    if let Some(writer) = stderr_writer {
        if let Some(child_stderr) = child.stderr.take() {
            copiers.push(thread::spawn(move || forward_output(child_stderr, writer)));
        }
    }

    let status = child.wait()?;

    let mut copy_error: Option<io::Error> = None;
    for copier in copiers {
        let result = copier.join().unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "stream copier thread panicked",
            ))
        });
        if let Err(err) = result {
            if copy_error.is_none() {
                copy_error = Some(err);
            }
        }
    }

    check_status(status, &argv)?;
    match copy_error {
        Some(err) => Err(ShrunError::Io(err)),
        None => Ok(()),
    }
}

/// Stream a configured reader into the child's stdin, closing it on EOF.
///
/// The lock is held per chunk, never across a blocking read of a shared
/// stream by another stage.
fn feed_stdin(reader: SharedReader, mut child_stdin: ChildStdin) -> io::Result<()> {
    let mut buffer = [0u8; 8192];
    loop {
        let n = {
            let mut reader = reader.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            reader.read(&mut buffer)?
        };
        if n == 0 {
            // Dropping child_stdin closes the pipe and delivers EOF.
            return Ok(());
        }
        if let Err(err) = child_stdin.write_all(&buffer[..n]) {
            // The child stopped reading early; normal for commands like
            // head that exit before consuming all input.
            if err.kind() == io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(err);
        }
    }
}

/// Stream a child output handle into a configured writer until EOF.
fn forward_output(mut from: impl Read, writer: SharedWriter) -> io::Result<()> {
    let mut buffer = [0u8; 8192];
    loop {
        let n = from.read(&mut buffer)?;
        if n == 0 {
            return Ok(());
        }
        let mut writer = writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(&buffer[..n])?;
    }
}
