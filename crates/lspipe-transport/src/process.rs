use std::ffi::{OsStr, OsString};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::signal::SigpipeGuard;
use crate::traits::{ReadStatus, TryRead};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to launch the child process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Executable name (looked up on `PATH`) or path.
    pub program: PathBuf,
    /// Arguments passed after the program name.
    pub args: Vec<OsString>,
    /// Let the child write to the parent's stderr. When false it goes to `/dev/null`.
    pub inherit_stderr: bool,
    /// Pass the parent's environment through. When false the child starts with an
    /// empty environment plus `envs`.
    pub inherit_env: bool,
    /// Extra environment variables for the child.
    pub envs: Vec<(OsString, OsString)>,
    /// Working directory for the child.
    pub current_dir: Option<PathBuf>,
}

impl SpawnConfig {
    /// Launch `program` with no arguments, discarded stderr and an empty environment.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            inherit_stderr: false,
            inherit_env: false,
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn inherit_stderr(mut self, inherit: bool) -> Self {
        self.inherit_stderr = inherit;
        self
    }

    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// `PATH` used for program lookup: an explicit override wins, then the parent's.
    fn search_path(&self) -> Option<OsString> {
        self.envs
            .iter()
            .rev()
            .find(|(key, _)| key == OsStr::new("PATH"))
            .map(|(_, value)| value.clone())
            .or_else(|| std::env::var_os("PATH"))
    }
}

/// Resolve `program` to an executable path.
///
/// Names without a path separator are searched on `search_path`; anything else must
/// name an existing file.
pub fn resolve_program(program: &Path, search_path: Option<&OsStr>) -> Result<PathBuf> {
    let not_found = || TransportError::ProgramNotFound {
        program: program.to_path_buf(),
    };

    if program.as_os_str().is_empty() {
        return Err(not_found());
    }

    if program.components().count() > 1 || program.is_absolute() {
        return if program.is_file() {
            Ok(program.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    let search_path = search_path.ok_or_else(not_found)?;
    std::env::split_paths(search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` is an open descriptor owned by the caller for the duration of the call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: same descriptor; only the status flags are changed.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Parent side of the child's stdout pipe. Reads never block.
#[derive(Debug)]
pub struct PipeReader {
    inner: ChildStdout,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl AsRawFd for PipeReader {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl AsFd for PipeReader {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

/// Parent side of the child's stdin pipe. Writes block.
///
/// Holds a [`SigpipeGuard`], so writing after the child has exited fails with
/// `BrokenPipe` instead of killing the parent.
#[derive(Debug)]
pub struct PipeWriter {
    inner: ChildStdin,
    _sigpipe: SigpipeGuard,
}

impl PipeWriter {
    /// Write every byte of `bytes` or fail.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl AsRawFd for PipeWriter {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

/// Handle on the spawned child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    program: PathBuf,
}

impl ChildProcess {
    /// OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Resolved executable path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Exit status if the child has exited, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(Into::into)
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().map_err(Into::into)
    }

    /// Wait up to `timeout` for the child to exit.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Send SIGKILL. Killing an already reaped child is not an error.
    pub fn kill(&mut self) -> Result<()> {
        match self.child.kill() {
            Ok(()) => {
                debug!(pid = self.id(), "killed child process");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

/// A spawned child with its stdin and stdout wired to two pipes.
///
/// Each pipe end is closed exactly once: by [`ProcessChannel::close`] or on drop.
#[derive(Debug)]
pub struct ProcessChannel {
    reader: Option<PipeReader>,
    writer: Option<PipeWriter>,
    child: ChildProcess,
}

impl ProcessChannel {
    /// Spawn `program` with `args` under an empty environment.
    pub fn create<I, S>(program: impl Into<PathBuf>, args: I, inherit_stderr: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self::spawn(
            &SpawnConfig::new(program)
                .args(args)
                .inherit_stderr(inherit_stderr),
        )
    }

    /// Spawn a child as described by `config`.
    pub fn spawn(config: &SpawnConfig) -> Result<Self> {
        let search_path = config.search_path();
        let program = resolve_program(&config.program, search_path.as_deref())?;
        let sigpipe = SigpipeGuard::acquire().map_err(TransportError::Configure)?;

        let mut command = Command::new(&program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if config.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            });
        if !config.inherit_env {
            command.env_clear();
        }
        command.envs(config.envs.iter().map(|(key, value)| (key, value)));
        if let Some(dir) = &config.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            program: config.program.clone(),
            source,
        })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                reap(&mut child);
                return Err(TransportError::Configure(io::Error::other(
                    "child stdio pipes were not created",
                )));
            }
        };

        if let Err(err) = set_nonblocking(stdout.as_raw_fd()) {
            reap(&mut child);
            return Err(TransportError::Configure(err));
        }

        info!(pid = child.id(), program = ?program, "spawned child process");

        Ok(Self {
            reader: Some(PipeReader { inner: stdout }),
            writer: Some(PipeWriter {
                inner: stdin,
                _sigpipe: sigpipe,
            }),
            child: ChildProcess { child, program },
        })
    }

    /// OS process id of the child.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Exit status if the child has exited, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait()
    }

    /// Kill the child. The pipes stay open until [`close`](Self::close) or drop.
    pub fn kill(&mut self) -> Result<()> {
        self.child.kill()
    }

    /// Blocking write of every byte to the child's stdin.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .as_mut()
            .ok_or(TransportError::Closed)?
            .write_bytes(bytes)
    }

    /// Single non-blocking read from the child's stdout.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        self.reader
            .as_mut()
            .ok_or(TransportError::Closed)?
            .try_read(buf)
    }

    /// Close the child's stdin, signalling end of input.
    pub fn close_stdin(&mut self) {
        if self.writer.take().is_some() {
            debug!(pid = self.pid(), "closed child stdin");
        }
    }

    /// Close both pipe ends. Calling it again is a no-op.
    pub fn close(&mut self) {
        self.close_stdin();
        if self.reader.take().is_some() {
            debug!(pid = self.pid(), "closed child stdout");
        }
    }

    /// True once both pipe ends have been closed.
    pub fn is_closed(&self) -> bool {
        self.reader.is_none() && self.writer.is_none()
    }

    /// Borrow the child handle.
    pub fn child(&self) -> &ChildProcess {
        &self.child
    }

    /// Mutably borrow the child handle.
    pub fn child_mut(&mut self) -> &mut ChildProcess {
        &mut self.child
    }

    /// Split into independently owned read end, write end and child handle.
    ///
    /// Fails with [`TransportError::Closed`] if either pipe end was already closed.
    pub fn into_parts(self) -> Result<(PipeReader, PipeWriter, ChildProcess)> {
        match (self.reader, self.writer) {
            (Some(reader), Some(writer)) => Ok((reader, writer, self.child)),
            _ => Err(TransportError::Closed),
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
