/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (spawn failure, pipe setup, process control).
    #[error("transport error: {0}")]
    Transport(#[from] lspipe_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] lspipe_frame::FrameError),

    /// A previous transport or framing error left the peer unusable.
    #[error("peer is broken: {0}")]
    Broken(String),

    /// The pipes were closed by this side.
    #[error("peer closed")]
    Closed,

    /// The child closed its output.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Waiting for a frame timed out.
    #[error("receive timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, PeerError>;
