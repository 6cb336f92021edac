use std::fmt;
use std::io;

use lspipe_frame::FrameError;
use lspipe_peer::PeerError;
use lspipe_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
/// The child program could not be found or started (shell convention).
pub const SPAWN_FAILED: i32 = 127;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut => TIMEOUT,
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::ProgramNotFound { .. } | TransportError::Spawn { .. } => {
            CliError::new(SPAWN_FAILED, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Transport(source) => transport_error(context, source),
        FrameError::ConnectionClosed | FrameError::Truncated { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ref corrupt if corrupt.is_protocol_corruption() => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        PeerError::Disconnected(_) | PeerError::Broken(_) | PeerError::Closed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn spawn_failures_map_to_127() {
        let err = PeerError::Transport(TransportError::ProgramNotFound {
            program: PathBuf::from("nope"),
        });
        assert_eq!(peer_error("spawn failed", err).code, SPAWN_FAILED);
    }

    #[test]
    fn corruption_is_data_invalid() {
        let err = PeerError::Frame(FrameError::InvalidHeader("Bad-Header: 5".to_string()));
        let cli = peer_error("receive failed", err);
        assert_eq!(cli.code, DATA_INVALID);
        assert!(cli.message.starts_with("receive failed: "));
    }

    #[test]
    fn timeouts_and_disconnects() {
        assert_eq!(
            peer_error("x", PeerError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(
            peer_error("x", PeerError::Disconnected("cat:1".to_string())).code,
            FAILURE
        );
        assert_eq!(
            peer_error("x", PeerError::Frame(FrameError::ConnectionClosed)).code,
            FAILURE
        );
    }
}
