use std::io::{ErrorKind, Read};

use crate::error::{Result, TransportError};

/// Outcome of a single non-blocking read attempt.
///
/// `WouldBlock` and `Eof` are both "no bytes this time", but they mean different
/// things: the first says "ask again later", the second says the writer closed its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes (always > 0) were copied into the buffer.
    Data(usize),
    /// Nothing is available right now; the stream is still open.
    WouldBlock,
    /// The other side closed the stream.
    Eof,
}

/// A single non-blocking read attempt over a byte source.
///
/// Implemented for every [`Read`]: `EINTR` is retried, `EAGAIN` becomes
/// [`ReadStatus::WouldBlock`] and a zero-length read into a non-empty buffer becomes
/// [`ReadStatus::Eof`].
pub trait TryRead {
    /// Attempt to fill `buf` without blocking.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadStatus>;
}

impl<R: Read + ?Sized> TryRead for R {
    fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        if buf.is_empty() {
            return Ok(ReadStatus::WouldBlock);
        }
        loop {
            match self.read(buf) {
                Ok(0) => return Ok(ReadStatus::Eof),
                Ok(n) => return Ok(ReadStatus::Data(n)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(ReadStatus::WouldBlock)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}
