use std::fs;
use std::time::{Duration, Instant};

use lspipe_frame::Frame;
use lspipe_peer::{is_response_to, Peer, PeerError};
use tracing::debug;

use crate::cmd::{parse_duration, shutdown_peer, spawn_peer, SendArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;
    let expect_id = request_id(&payload);

    let mut peer = spawn_peer(&args.child)?;
    let exchanged = exchange(&mut peer, &payload, args.wait, expect_id, wait_timeout, format);
    let stopped = shutdown_peer(&mut peer, &args.child, format);

    exchanged?;
    stopped?;
    Ok(SUCCESS)
}

fn exchange(
    peer: &mut Peer,
    payload: &[u8],
    wait: bool,
    expect_id: Option<u64>,
    wait_timeout: Duration,
    format: OutputFormat,
) -> CliResult<()> {
    peer.send(payload)
        .map_err(|err| peer_error("send failed", err))?;

    if wait {
        let frame = wait_for_response(peer, expect_id, wait_timeout)
            .map_err(|err| peer_error("receive failed", err))?;
        print_frame(&frame, 1, peer.id(), format);
    }
    Ok(())
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Err(CliError::new(USAGE, "one of --json, --data or --file is required"))
}

/// Numeric id of a JSON-RPC request payload, if it is one.
fn request_id(payload: &[u8]) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value.get("method")?;
    value.get("id")?.as_u64()
}

trait ResponseSource {
    fn recv_within(&mut self, timeout: Duration) -> Result<Frame, PeerError>;
}

impl ResponseSource for Peer {
    fn recv_within(&mut self, timeout: Duration) -> Result<Frame, PeerError> {
        self.recv_timeout(timeout)
    }
}

/// Wait for the reply. For a JSON-RPC request, frames that are not its response
/// (notifications, server-initiated requests) are skipped.
fn wait_for_response<R: ResponseSource>(
    source: &mut R,
    expect_id: Option<u64>,
    timeout: Duration,
) -> Result<Frame, PeerError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PeerError::Timeout(timeout));
        }
        let frame = source.recv_within(remaining)?;
        match expect_id {
            Some(id) if !is_response_to(&frame.payload, id) => {
                debug!(bytes = frame.payload.len(), "skipping frame while waiting for response");
            }
            _ => return Ok(frame),
        }
    }
}
