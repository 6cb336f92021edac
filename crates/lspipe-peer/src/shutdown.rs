use std::io::{Read, Write};
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lspipe_frame::{FrameReader, FrameWriter};
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::control::{is_response_to, ControlMessage};

/// Messages exchanged before the pipes are closed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShutdownProtocol {
    /// JSON-RPC `shutdown` request, acknowledged by a response with the same id,
    /// followed by an `exit` notification.
    #[default]
    JsonRpc,
    /// Caller-supplied payloads. Any frame received after `request` acknowledges it.
    Custom {
        request: Bytes,
        exit: Option<Bytes>,
    },
    /// Send nothing; just close the pipes and wait for the child.
    Silent,
}

/// Graceful shutdown settings.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    pub protocol: ShutdownProtocol,
    /// How long to wait for the acknowledgement.
    pub timeout: Duration,
    /// How long to wait for the child to exit once its pipes are closed.
    pub exit_grace: Duration,
    /// Kill the child if it outlives `exit_grace`.
    pub force_kill: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            protocol: ShutdownProtocol::default(),
            timeout: Duration::from_secs(5),
            exit_grace: Duration::from_secs(2),
            force_kill: true,
        }
    }
}

/// What a shutdown actually achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The child answered the shutdown request in time.
    pub acknowledged: bool,
    /// The exit message was written.
    pub exit_sent: bool,
    /// Frames received while waiting that were not the acknowledgement.
    pub discarded_frames: usize,
    /// Exit status, if the child was reaped.
    pub exit_status: Option<ExitStatus>,
    /// The child had to be killed.
    pub forced: bool,
}

/// Run the message part of a shutdown over an open frame stream.
///
/// Every step is best-effort: failures are logged and reflected in the returned report,
/// never propagated. Process fields of the report are left unset.
pub fn negotiate<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    protocol: &ShutdownProtocol,
    request_id: u64,
    timeout: Duration,
    backoff: &Backoff,
) -> ShutdownReport {
    let mut report = ShutdownReport::default();

    let (request, exit) = match protocol {
        ShutdownProtocol::Silent => return report,
        ShutdownProtocol::JsonRpc => {
            let request = ControlMessage::shutdown_request(request_id).to_payload();
            let exit = ControlMessage::exit_notification().to_payload();
            match (request, exit) {
                (Ok(request), Ok(exit)) => (Bytes::from(request), Some(Bytes::from(exit))),
                (Err(err), _) | (_, Err(err)) => {
                    warn!(error = %err, "could not encode shutdown messages");
                    return report;
                }
            }
        }
        ShutdownProtocol::Custom { request, exit } => (request.clone(), exit.clone()),
    };

    if let Err(err) = writer.send(&request) {
        warn!(error = %err, "failed to send shutdown request");
        return report;
    }
    debug!(request_id, "sent shutdown request");

    let acknowledged = wait_for_ack(reader, protocol, request_id, timeout, backoff, &mut report);
    report.acknowledged = acknowledged;

    if let Some(exit) = exit {
        match writer.send(&exit) {
            Ok(()) => report.exit_sent = true,
            Err(err) => warn!(error = %err, "failed to send exit message"),
        }
    }

    report
}

fn wait_for_ack<R: Read>(
    reader: &mut FrameReader<R>,
    protocol: &ShutdownProtocol,
    request_id: u64,
    timeout: Duration,
    backoff: &Backoff,
    report: &mut ShutdownReport,
) -> bool {
    let deadline = Instant::now() + timeout;
    let mut timer = backoff.start();

    loop {
        match reader.poll_frame() {
            Ok(Some(frame)) => {
                let acked = match protocol {
                    ShutdownProtocol::JsonRpc => is_response_to(&frame.payload, request_id),
                    _ => true,
                };
                if acked {
                    debug!(request_id, "shutdown acknowledged");
                    return true;
                }
                report.discarded_frames += 1;
                warn!(
                    bytes = frame.payload.len(),
                    "discarding frame received while waiting for shutdown acknowledgement"
                );
                if Instant::now() >= deadline {
                    debug!(?timeout, "shutdown acknowledgement timed out");
                    return false;
                }
                timer.reset();
            }
            Ok(None) if reader.is_eof() => {
                debug!("child closed its output before acknowledging shutdown");
                return false;
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    debug!(?timeout, "shutdown acknowledgement timed out");
                    return false;
                }
                timer.wait(Some(deadline));
            }
            Err(err) => {
                warn!(error = %err, "frame stream failed during shutdown");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use lspipe_frame::{encode, FrameDecoder};

    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Bytes> {
        let mut decoder = FrameDecoder::new();
        decoder.extend(bytes);
        let mut out = Vec::new();
        while let Some(payload) = decoder.decode().unwrap() {
            out.push(payload);
        }
        out
    }

    fn run(
        incoming: &[u8],
        protocol: &ShutdownProtocol,
        request_id: u64,
    ) -> (ShutdownReport, Vec<Bytes>) {
        let mut reader = FrameReader::new(Cursor::new(incoming.to_vec()));
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let report = negotiate(
            &mut reader,
            &mut writer,
            protocol,
            request_id,
            Duration::from_millis(100),
            &Backoff::Busy,
        );
        let sent = decode_all(writer.into_inner().get_ref());
        (report, sent)
    }

    #[test]
    fn json_rpc_acknowledged() {
        let incoming = encode(br#"{"jsonrpc":"2.0","id":4,"result":null}"#);
        let (report, sent) = run(&incoming, &ShutdownProtocol::JsonRpc, 4);

        assert!(report.acknowledged);
        assert!(report.exit_sent);
        assert_eq!(report.discarded_frames, 0);
        assert_eq!(
            sent,
            vec![
                Bytes::from_static(br#"{"jsonrpc":"2.0","id":4,"method":"shutdown"}"#),
                Bytes::from_static(br#"{"jsonrpc":"2.0","method":"exit"}"#),
            ]
        );
    }

    #[test]
    fn unrelated_frames_are_discarded() {
        let mut incoming = encode(br#"{"jsonrpc":"2.0","method":"window/logMessage"}"#).to_vec();
        incoming.extend_from_slice(&encode(br#"{"jsonrpc":"2.0","id":9,"result":{}}"#));
        incoming.extend_from_slice(&encode(br#"{"jsonrpc":"2.0","id":1,"result":null}"#));
        let (report, _) = run(&incoming, &ShutdownProtocol::JsonRpc, 1);

        assert!(report.acknowledged);
        assert_eq!(report.discarded_frames, 2);
    }

    #[test]
    fn eof_without_ack_still_sends_exit() {
        let (report, sent) = run(b"", &ShutdownProtocol::JsonRpc, 1);
        assert!(!report.acknowledged);
        assert!(report.exit_sent);
        assert_eq!(sent.len(), 2);
    }

    #[test]
    fn corrupt_stream_ends_wait() {
        let (report, _) = run(b"Bad-Header: 5\r\n\r\nhello", &ShutdownProtocol::JsonRpc, 1);
        assert!(!report.acknowledged);
        assert!(report.exit_sent);
    }

    #[test]
    fn custom_protocol_accepts_any_frame() {
        let protocol = ShutdownProtocol::Custom {
            request: Bytes::from_static(b"bye"),
            exit: None,
        };
        let (report, sent) = run(&encode(b"ok"), &protocol, 1);

        assert!(report.acknowledged);
        assert!(!report.exit_sent);
        assert_eq!(sent, vec![Bytes::from_static(b"bye")]);
    }

    #[test]
    fn silent_protocol_writes_nothing() {
        let (report, sent) = run(&encode(b"ignored"), &ShutdownProtocol::Silent, 1);
        assert_eq!(report, ShutdownReport::default());
        assert!(sent.is_empty());
    }

    #[test]
    fn times_out_when_nothing_arrives() {
        struct Idle;
        impl Read for Idle {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(ErrorKind::WouldBlock.into())
            }
        }

        let mut reader = FrameReader::new(Idle);
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let started = Instant::now();
        let report = negotiate(
            &mut reader,
            &mut writer,
            &ShutdownProtocol::JsonRpc,
            1,
            Duration::from_millis(30),
            &Backoff::Fixed(Duration::from_millis(5)),
        );

        assert!(!report.acknowledged);
        assert!(report.exit_sent);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn endless_notifications_still_time_out() {
        struct Chatty {
            frame: Vec<u8>,
            offset: usize,
        }
        impl Read for Chatty {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let mut n = 0;
                while n < buf.len() {
                    buf[n] = self.frame[self.offset];
                    self.offset = (self.offset + 1) % self.frame.len();
                    n += 1;
                }
                Ok(n)
            }
        }

        let mut reader = FrameReader::new(Chatty {
            frame: encode(br#"{"jsonrpc":"2.0","method":"window/logMessage"}"#).to_vec(),
            offset: 0,
        });
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let started = Instant::now();
        let report = negotiate(
            &mut reader,
            &mut writer,
            &ShutdownProtocol::JsonRpc,
            1,
            Duration::from_millis(50),
            &Backoff::Busy,
        );

        assert!(!report.acknowledged);
        assert!(report.exit_sent);
        assert!(report.discarded_frames > 0);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn failed_request_skips_exit() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let mut writer = FrameWriter::new(Closed);
        let report = negotiate(
            &mut reader,
            &mut writer,
            &ShutdownProtocol::JsonRpc,
            1,
            Duration::from_millis(10),
            &Backoff::Busy,
        );
        assert!(!report.acknowledged);
        assert!(!report.exit_sent);
    }
}
