//! `Content-Length` message framing over non-blocking byte streams.
//!
//! Every message is framed as:
//! - the ASCII header `Content-Length: <n>`
//! - the delimiter `\r\n\r\n`
//! - exactly `n` bytes of opaque payload
//!
//! [`FrameReader`] reassembles frames from a stream that may hand out any number of
//! bytes per read, including none at all, without losing partial progress.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::ContentLengthCodec;
pub use codec::{
    encode, encode_frame, encoded_len, parse_header, Frame, FrameConfig, FrameDecoder,
    CONTENT_LENGTH, DEFAULT_MAX_HEADER, DEFAULT_MAX_PAYLOAD, DEFAULT_READ_CHUNK, DELIMITER,
    HEADER_READ_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
