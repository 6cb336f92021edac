use std::path::Path;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use lspipe_frame::{Frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use lspipe_transport::{ChildProcess, PipeReader, PipeWriter, ProcessChannel, SpawnConfig};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{PeerError, Result};
use crate::shutdown::{self, ShutdownConfig, ShutdownReport};

/// Runtime behavior for a spawned peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub frame: FrameConfig,
    /// Retry policy for [`Peer::recv_timeout`] and the shutdown wait.
    pub backoff: Backoff,
    pub shutdown: ShutdownConfig,
    /// Kill a still-running child when the peer is dropped.
    pub kill_on_drop: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            backoff: Backoff::default(),
            shutdown: ShutdownConfig::default(),
            kill_on_drop: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Open,
    Broken(String),
    Closed,
}

/// A spawned child process speaking Content-Length framed messages on stdio.
///
/// Frames are written with [`send`](Self::send), which blocks until the whole frame is in
/// the pipe, and collected with [`poll`](Self::poll), which never blocks. Any framing or
/// pipe failure leaves the peer broken; later calls fail with [`PeerError::Broken`].
#[derive(Debug)]
pub struct Peer {
    id: String,
    reader: Option<FrameReader<PipeReader>>,
    writer: Option<FrameWriter<PipeWriter>>,
    child: ChildProcess,
    config: PeerConfig,
    state: State,
    next_request_id: u64,
}

impl Peer {
    /// Spawn a child as described by `config` with default peer settings.
    pub fn spawn(config: &SpawnConfig) -> Result<Self> {
        crate::spawner::spawn_with_config(config, PeerConfig::default())
    }

    /// Wrap an already spawned channel.
    pub fn from_channel(channel: ProcessChannel, config: PeerConfig) -> Result<Self> {
        let (reader, writer, child) = channel.into_parts()?;
        let id = peer_id(child.program(), child.id());
        debug!(peer = %id, "peer ready");

        Ok(Self {
            id,
            reader: Some(FrameReader::with_config(reader, config.frame.clone())),
            writer: Some(FrameWriter::with_config(writer, config.frame.clone())),
            child,
            config,
            state: State::Open,
            next_request_id: 1,
        })
    }

    /// Display identity: program name and pid.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn program(&self) -> &Path {
        self.child.program()
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Allocate the next JSON-RPC request id. Ids start at 1 and only increase.
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Send one payload as a frame.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let result = self.writer()?.send(payload);
        match result {
            // Rejected before any byte was written; the stream is still in sync.
            Err(err @ FrameError::PayloadTooLarge { .. }) => Err(PeerError::Frame(err)),
            other => other.map_err(|err| self.fail(err)),
        }
    }

    /// Send a prepared frame.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.payload.as_ref())
    }

    /// Return the next complete frame if one is available, without blocking.
    ///
    /// `Ok(None)` means nothing yet, or that the child closed its output between frames;
    /// [`is_eof`](Self::is_eof) tells them apart.
    pub fn poll(&mut self) -> Result<Option<Frame>> {
        let result = self.reader()?.poll_frame();
        result.map_err(|err| self.fail(err))
    }

    /// Poll with backoff until a frame arrives, the child closes its output or `timeout`
    /// elapses.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        let mut timer = self.config.backoff.start();

        loop {
            if let Some(frame) = self.poll()? {
                return Ok(frame);
            }
            if self.is_eof() {
                return Err(PeerError::Disconnected(format!(
                    "{} closed its output",
                    self.id
                )));
            }
            if Instant::now() >= deadline {
                return Err(PeerError::Timeout(timeout));
            }
            timer.wait(Some(deadline));
        }
    }

    /// True once the child closed its stdout cleanly.
    pub fn is_eof(&self) -> bool {
        self.reader.as_ref().is_some_and(FrameReader::is_eof)
    }

    pub fn is_broken(&self) -> bool {
        matches!(self.state, State::Broken(_))
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Gracefully stop the child.
    ///
    /// Runs the configured shutdown exchange (skipped if the peer is broken), closes both
    /// pipes, then waits for the child, killing it after the grace period if configured.
    pub fn shutdown(&mut self) -> Result<ShutdownReport> {
        if self.is_closed() {
            return Err(PeerError::Closed);
        }

        let mut report = ShutdownReport::default();
        if self.state == State::Open {
            let request_id = self.next_request_id();
            if let (Some(reader), Some(writer)) = (self.reader.as_mut(), self.writer.as_mut()) {
                report = shutdown::negotiate(
                    reader,
                    writer,
                    &self.config.shutdown.protocol,
                    request_id,
                    self.config.shutdown.timeout,
                    &self.config.backoff,
                );
            }
        }

        self.close();

        let grace = self.config.shutdown.exit_grace;
        report.exit_status = self.child.wait_timeout(grace)?;
        if report.exit_status.is_none() && self.config.shutdown.force_kill {
            warn!(peer = %self.id, ?grace, "child did not exit after shutdown, killing it");
            self.child.kill()?;
            report.exit_status = Some(self.child.wait()?);
            report.forced = true;
        }

        info!(
            peer = %self.id,
            acknowledged = report.acknowledged,
            forced = report.forced,
            status = ?report.exit_status,
            "peer shut down"
        );
        Ok(report)
    }

    /// Close both pipes. Calling it again is a no-op.
    pub fn close(&mut self) {
        let had_pipes = self.writer.take().is_some() | self.reader.take().is_some();
        if had_pipes {
            debug!(peer = %self.id, "closed peer pipes");
        }
        self.state = State::Closed;
    }

    /// Kill the child immediately.
    pub fn kill(&mut self) -> Result<()> {
        self.child.kill().map_err(Into::into)
    }

    /// Exit status if the child has exited, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(Into::into)
    }

    /// Wait up to `timeout` for the child to exit.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        self.child.wait_timeout(timeout).map_err(Into::into)
    }

    fn check_state(&self) -> Result<()> {
        match &self.state {
            State::Open => Ok(()),
            State::Broken(reason) => Err(PeerError::Broken(reason.clone())),
            State::Closed => Err(PeerError::Closed),
        }
    }

    fn reader(&mut self) -> Result<&mut FrameReader<PipeReader>> {
        self.check_state()?;
        self.reader.as_mut().ok_or(PeerError::Closed)
    }

    fn writer(&mut self) -> Result<&mut FrameWriter<PipeWriter>> {
        self.check_state()?;
        self.writer.as_mut().ok_or(PeerError::Closed)
    }

    fn fail(&mut self, err: FrameError) -> PeerError {
        warn!(peer = %self.id, error = %err, "peer marked broken");
        self.state = State::Broken(err.to_string());
        PeerError::Frame(err)
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.close();
        if self.config.kill_on_drop && matches!(self.child.try_wait(), Ok(None)) {
            debug!(peer = %self.id, "killing child on drop");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn peer_id(program: &Path, pid: u32) -> String {
    let name = program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());
    format!("{name}:{pid}")
}
