//! Process launch with raw-byte capture, timeout and cancellation.
//!
//! stdout and stderr are drained as raw bytes by two background reader
//! threads and streamed to the waiting thread over a [`crossbeam_channel`].
//! Nothing is decoded until the run is over, so multi-byte sequences split
//! across reads are never corrupted. The waiting thread polls process
//! liveness, the wall-clock timeout and the [`CancelToken`] every
//! [`EXEC_POLL_INTERVAL`].

use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::exec::decoder::ByteDecoder;
use crate::util::cancel::CancelToken;
use crate::util::constants::*;

/// Outcome of one process invocation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub canceled: bool,
}

impl CommandResult {
    /// stdout and stderr joined by a newline, for phrase matching.
    pub fn combined_text(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Result used when the process could not be started at all.
    pub fn spawn_failed(program: &str, error: &std::io::Error) -> Self {
        Self {
            exit_code: EXIT_SPAWN_FAILED,
            stdout: String::new(),
            stderr: format!("No se pudo iniciar el proceso '{program}': {error}"),
            timed_out: false,
            canceled: false,
        }
    }
}

/// A program, its arguments and the wall-clock budget for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Seam between remediation tasks and the operating system.
///
/// [`ProcessRunner`] is the real implementation; tests substitute a
/// scripted runner.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> CommandResult;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    decoder: ByteDecoder,
}

impl ProcessRunner {
    pub fn new(decoder: ByteDecoder) -> Self {
        Self { decoder }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> CommandResult {
        execute_with(&self.decoder, &spec.program, &spec.args, spec.timeout, cancel)
    }
}

/// Run `program` with `args`, decoding output with the system decoder.
///
/// A zero `timeout` disables the wall-clock limit.
pub fn execute(
    program: &str,
    args: &[String],
    timeout: Duration,
    cancel: &CancelToken,
) -> CommandResult {
    execute_with(&ByteDecoder::for_system(), program, args, timeout, cancel)
}

/// Run `program` with `args` and decode its output with `decoder`.
///
/// Never fails: spawn errors, timeouts and cancellation all come back as a
/// [`CommandResult`].
pub fn execute_with(
    decoder: &ByteDecoder,
    program: &str,
    args: &[String],
    timeout: Duration,
    cancel: &CancelToken,
) -> CommandResult {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    hide_console_window(&mut command);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!("Failed to start '{}': {}", program, e);
            return CommandResult::spawn_failed(program, &e);
        }
    };
    tracing::debug!("Started '{}' (pid {})", program, child.id());

    let (tx, rx) = crossbeam_channel::unbounded::<Chunk>();
    let mut readers = Vec::with_capacity(2);
    if let Some(pipe) = child.stdout.take() {
        readers.extend(spawn_pipe_reader("exec-stdout", pipe, Stream::Stdout, tx.clone()));
    }
    if let Some(pipe) = child.stderr.take() {
        readers.extend(spawn_pipe_reader("exec-stderr", pipe, Stream::Stderr, tx.clone()));
    }
    drop(tx);

    let start = Instant::now();
    let deadline_passed = || !timeout.is_zero() && start.elapsed() >= timeout;
    let mut captured = Captured::default();

    // Phase 1: wait for the process to exit.
    let exit_code = loop {
        if cancel.is_cancelled() {
            kill_child(&mut child, program);
            captured.settle(&rx, readers, program);
            tracing::info!("'{}' cancelled after {:.1}s", program, start.elapsed().as_secs_f64());
            return captured.finish(decoder, Ending::Canceled);
        }

        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(EXIT_TIMED_OUT),
            Ok(None) => {}
            Err(e) => {
                kill_child(&mut child, program);
                captured.settle(&rx, readers, program);
                return captured.finish(decoder, Ending::WaitFailed(e.to_string()));
            }
        }

        if deadline_passed() {
            kill_child(&mut child, program);
            captured.settle(&rx, readers, program);
            tracing::warn!("'{}' timed out after {:?}", program, timeout);
            return captured.finish(decoder, Ending::TimedOut(timeout));
        }

        if !captured.pump(&rx, EXEC_POLL_INTERVAL) {
            std::thread::sleep(EXEC_POLL_INTERVAL);
        }
    };

    // Phase 2: drain until both pipes close. A grandchild that inherited the
    // pipes can keep them open, so cancellation and the deadline still apply.
    loop {
        if cancel.is_cancelled() {
            captured.settle(&rx, readers, program);
            return captured.finish(decoder, Ending::Canceled);
        }
        if deadline_passed() {
            tracing::warn!(
                "'{}' exited but its output pipes are still open; returning captured output",
                program
            );
            captured.settle(&rx, readers, program);
            return captured.finish(decoder, Ending::Exited(exit_code));
        }
        if !captured.pump(&rx, EXEC_POLL_INTERVAL) {
            break;
        }
    }

    for reader in readers {
        let _ = reader.join();
    }

    tracing::debug!(
        "'{}' exited with {} in {:.2}s",
        program,
        exit_code,
        start.elapsed().as_secs_f64()
    );
    captured.finish(decoder, Ending::Exited(exit_code))
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

struct Chunk {
    stream: Stream,
    bytes: Vec<u8>,
}

enum Ending {
    Exited(i32),
    TimedOut(Duration),
    Canceled,
    WaitFailed(String),
}

#[derive(Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    fn absorb(&mut self, chunk: Chunk) {
        match chunk.stream {
            Stream::Stdout => self.stdout.extend_from_slice(&chunk.bytes),
            Stream::Stderr => self.stderr.extend_from_slice(&chunk.bytes),
        }
    }

    /// Wait up to `wait` for output, then take whatever else is queued.
    /// Returns `false` once every reader has hung up.
    fn pump(&mut self, rx: &Receiver<Chunk>, wait: Duration) -> bool {
        match rx.recv_timeout(wait) {
            Ok(chunk) => {
                self.absorb(chunk);
                self.drain_ready(rx);
                true
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn drain_ready(&mut self, rx: &Receiver<Chunk>) {
        for chunk in rx.try_iter() {
            self.absorb(chunk);
        }
    }

    /// After an early exit: collect trailing output for up to
    /// [`READER_JOIN_GRACE`] and join the readers once both pipes closed.
    /// Readers still blocked on a pipe held open by a grandchild are left
    /// detached; they end when that pipe closes.
    fn settle(&mut self, rx: &Receiver<Chunk>, readers: Vec<JoinHandle<()>>, program: &str) {
        let grace = Instant::now() + READER_JOIN_GRACE;
        let closed = loop {
            let now = Instant::now();
            if now >= grace {
                break false;
            }
            if !self.pump(rx, (grace - now).min(EXEC_POLL_INTERVAL)) {
                break true;
            }
        };
        if closed {
            for reader in readers {
                let _ = reader.join();
            }
        } else {
            self.drain_ready(rx);
            tracing::warn!(
                "Output pipes of '{}' still open after {:?}; leaving {} reader thread(s) detached",
                program,
                READER_JOIN_GRACE,
                readers.len()
            );
        }
    }

    fn finish(self, decoder: &ByteDecoder, ending: Ending) -> CommandResult {
        let stdout = decoder.decode(&self.stdout);
        let stderr = decoder.decode(&self.stderr);
        match ending {
            Ending::Exited(exit_code) => CommandResult {
                exit_code,
                stdout,
                stderr,
                timed_out: false,
                canceled: false,
            },
            Ending::TimedOut(limit) => CommandResult {
                exit_code: EXIT_TIMED_OUT,
                stdout,
                stderr: append_note(
                    stderr,
                    &format!("TIMEOUT: el comando superó el tiempo límite de {}s.", limit.as_secs()),
                ),
                timed_out: true,
                canceled: false,
            },
            Ending::Canceled => CommandResult {
                exit_code: EXIT_CANCELED,
                stdout,
                stderr,
                timed_out: false,
                canceled: true,
            },
            Ending::WaitFailed(detail) => CommandResult {
                exit_code: EXIT_TIMED_OUT,
                stdout,
                stderr: append_note(stderr, &format!("No se pudo esperar al proceso: {detail}")),
                timed_out: false,
                canceled: false,
            },
        }
    }
}

fn append_note(stderr: String, note: &str) -> String {
    if stderr.trim().is_empty() {
        note.to_string()
    } else {
        format!("{}\n{note}", stderr.trim_end())
    }
}

/// Drain `pipe` into `tx` as raw chunks until EOF.
fn spawn_pipe_reader<R>(
    name: &str,
    mut pipe: R,
    stream: Stream,
    tx: Sender<Chunk>,
) -> Option<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let mut buf = vec![0u8; PIPE_READ_CHUNK];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = Chunk {
                            stream,
                            bytes: buf[..n].to_vec(),
                        };
                        if tx.send(chunk).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::trace!("{:?} pipe read failed: {}", stream, e);
                        break;
                    }
                }
            }
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Could not start {} reader thread: {}", name, e);
            None
        }
    }
}

/// Force-kill `child`. Failure is logged, never raised: the process may be
/// left running detached.
fn kill_child(child: &mut Child, program: &str) {
    match child.kill() {
        Ok(()) => {
            let _ = child.wait();
        }
        Err(e) => tracing::warn!(
            "Could not kill '{}' (pid {}): {}; it may keep running detached",
            program,
            child.id(),
            e
        ),
    }
}

#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}
