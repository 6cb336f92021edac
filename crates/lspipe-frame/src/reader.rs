use std::io::Read;

use lspipe_transport::ReadStatus;
use tracing::debug;

use crate::codec::{Frame, FrameConfig, FrameDecoder};
use crate::error::{FrameError, Result};

/// Reassembles frames from a non-blocking `Read` stream.
///
/// [`poll_frame`](Self::poll_frame) never blocks on a non-blocking source: it returns
/// `Ok(None)` as soon as the stream has nothing more to offer and picks up where it left
/// off on the next call.
#[derive(Debug)]
pub struct FrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
    eof: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::with_config(config),
            eof: false,
        }
    }

    /// Try to produce the next complete frame.
    ///
    /// - `Ok(Some(frame))`: one frame reassembled.
    /// - `Ok(None)`: no complete frame yet (the read would block), or the stream ended
    ///   cleanly between frames; see [`is_eof`](Self::is_eof).
    /// - `Err(FrameError::Truncated)`: the stream ended inside a frame.
    /// - other errors: I/O failure or protocol corruption; the stream is unusable.
    pub fn poll_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(payload) = self.decoder.decode()? {
                return Ok(Some(Frame::from(payload)));
            }

            if self.eof {
                return self.end_of_stream();
            }

            match self.decoder.read_from(&mut self.inner)? {
                ReadStatus::Data(_) => continue,
                ReadStatus::WouldBlock => return Ok(None),
                ReadStatus::Eof => {
                    self.eof = true;
                    debug!(buffered = self.decoder.buffered(), "frame stream reached EOF");
                    return self.end_of_stream();
                }
            }
        }
    }

    fn end_of_stream(&self) -> Result<Option<Frame>> {
        if self.decoder.is_idle() {
            Ok(None)
        } else {
            Err(FrameError::Truncated {
                received: self.decoder.buffered(),
            })
        }
    }

    /// True once the writer side closed the stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// True while a frame is partially received.
    pub fn has_partial_frame(&self) -> bool {
        !self.decoder.is_idle()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream. Buffered bytes are dropped.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.decoder.set_max_payload_size(max_payload_size);
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        self.decoder.config()
    }
}
