/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header is not a single `Content-Length: <n>` line.
    #[error("invalid frame header: {0:?}")]
    InvalidHeader(String),

    /// The declared length is missing, not a decimal number, zero or out of range.
    #[error("invalid content length: {0:?}")]
    InvalidLength(String),

    /// No header delimiter within the configured header budget.
    #[error("frame header too large ({size} bytes, max {max})")]
    HeaderTooLarge { size: usize, max: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream ended in the middle of a frame.
    #[error("stream closed mid-frame after {received} bytes")]
    Truncated { received: usize },

    /// The other side is gone; nothing more can be written.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying channel rejected the operation.
    #[error("transport error: {0}")]
    Transport(lspipe_transport::TransportError),
}

impl FrameError {
    /// True for errors caused by bytes on the wire that do not follow the framing.
    ///
    /// After one of these the stream cannot be resynchronized.
    pub fn is_protocol_corruption(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidHeader(_)
                | FrameError::InvalidLength(_)
                | FrameError::HeaderTooLarge { .. }
                | FrameError::PayloadTooLarge { .. }
        )
    }
}

impl From<lspipe_transport::TransportError> for FrameError {
    fn from(err: lspipe_transport::TransportError) -> Self {
        match err {
            lspipe_transport::TransportError::Io(io) => FrameError::Io(io),
            lspipe_transport::TransportError::Closed => FrameError::ConnectionClosed,
            other => FrameError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
