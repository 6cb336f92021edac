use std::io::Read;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use lspipe_transport::{ReadStatus, TryRead};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Header prefix, including the trailing space.
pub const CONTENT_LENGTH: &[u8] = b"Content-Length: ";

/// Separates the header from the body.
pub const DELIMITER: &[u8; 4] = b"\r\n\r\n";

/// Default maximum payload size: 64 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Default maximum header size, delimiter excluded.
pub const DEFAULT_MAX_HEADER: usize = 1024;

/// Size of each read while looking for the header delimiter.
pub const HEADER_READ_SIZE: usize = 64;

/// Upper bound for a single body read.
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// One decoded message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + delimiter + payload).
    pub fn wire_size(&self) -> usize {
        encoded_len(self.payload.len())
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn as_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Consume the frame and return the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl From<Bytes> for Frame {
    fn from(payload: Bytes) -> Self {
        Self { payload }
    }
}

/// Wire size of a frame carrying `payload_len` bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    CONTENT_LENGTH.len() + decimal_digits(payload_len) + DELIMITER.len() + payload_len
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// Content-Length: <decimal byte count>\r\n\r\n<payload>
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(encoded_len(payload.len()));
    dst.put_slice(CONTENT_LENGTH);
    dst.put_slice(payload.len().to_string().as_bytes());
    dst.put_slice(DELIMITER);
    dst.put_slice(payload);
}

/// Encode a payload into a freshly allocated buffer.
pub fn encode(payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(encoded_len(payload.len()));
    encode_frame(payload, &mut dst);
    dst.freeze()
}

/// Parse the header section (everything before the delimiter) into the declared length.
pub fn parse_header(header: &[u8], config: &FrameConfig) -> Result<usize> {
    let digits = header
        .strip_prefix(CONTENT_LENGTH)
        .ok_or_else(|| FrameError::InvalidHeader(preview(header)))?;

    if digits.contains(&b'\r') || digits.contains(&b'\n') {
        return Err(FrameError::InvalidHeader(preview(header)));
    }
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::InvalidLength(preview(digits)));
    }

    // All ASCII digits, so this is valid UTF-8; parsing only fails on overflow.
    let len: usize = std::str::from_utf8(digits)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| FrameError::InvalidLength(preview(digits)))?;

    if len == 0 && !config.allow_empty {
        return Err(FrameError::InvalidLength(preview(digits)));
    }
    if len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        });
    }
    Ok(len)
}

fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(64)]).into_owned()
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 64 MiB.
    pub max_payload_size: usize,
    /// Maximum header size in bytes, delimiter excluded. Default: 1 KiB.
    pub max_header_size: usize,
    /// Upper bound for a single body read. Default: 64 KiB.
    pub read_chunk_size: usize,
    /// Accept `Content-Length: 0`. Off by default: a declared length must be positive.
    pub allow_empty: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_header_size: DEFAULT_MAX_HEADER,
            read_chunk_size: DEFAULT_READ_CHUNK,
            allow_empty: false,
        }
    }
}

/// Resumable frame decoder.
///
/// Bytes go in through [`extend`](Self::extend) or [`read_from`](Self::read_from) in
/// whatever chunks the stream delivers; [`decode`](Self::decode) yields one payload per
/// complete frame. Nothing received is ever discarded between calls, and bytes past the
/// end of a frame stay buffered as the start of the next one.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Header bytes already searched for the delimiter.
    scanned: usize,
    declared: Option<usize>,
    config: FrameConfig,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(HEADER_READ_SIZE),
            scanned: 0,
            declared: None,
            config,
        }
    }

    /// Append received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Perform one non-blocking read from `src` sized by [`next_read_size`](Self::next_read_size).
    pub fn read_from<R: Read + ?Sized>(
        &mut self,
        src: &mut R,
    ) -> lspipe_transport::Result<ReadStatus> {
        let want = self.next_read_size();
        let start = self.buf.len();
        self.buf.resize(start + want, 0);
        let status = src.try_read(&mut self.buf[start..]);
        let filled = match status {
            Ok(ReadStatus::Data(n)) => n,
            _ => 0,
        };
        self.buf.truncate(start + filled);
        status
    }

    /// How many bytes the next read should ask for.
    ///
    /// Small bounded reads while the header is incomplete; afterwards exactly what the
    /// body still needs, capped at `read_chunk_size`.
    pub fn next_read_size(&self) -> usize {
        match self.declared {
            None => HEADER_READ_SIZE,
            Some(len) => len
                .saturating_sub(self.buf.len())
                .clamp(1, self.config.read_chunk_size.max(1)),
        }
    }

    /// Try to complete a frame from the buffered bytes.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn decode(&mut self) -> Result<Option<Bytes>> {
        let declared = match self.declared {
            Some(len) => len,
            None => {
                let Some(end) = self.find_delimiter() else {
                    if self.scanned > self.config.max_header_size {
                        return Err(FrameError::HeaderTooLarge {
                            size: self.scanned,
                            max: self.config.max_header_size,
                        });
                    }
                    return Ok(None);
                };
                if end > self.config.max_header_size {
                    return Err(FrameError::HeaderTooLarge {
                        size: end,
                        max: self.config.max_header_size,
                    });
                }

                let len = parse_header(&self.buf[..end], &self.config)?;
                self.buf.advance(end + DELIMITER.len());
                self.scanned = 0;
                self.declared = Some(len);
                trace!(len, "frame header parsed");
                len
            }
        };

        if self.buf.len() < declared {
            return Ok(None);
        }

        let payload = self.buf.split_to(declared).freeze();
        self.declared = None;
        trace!(len = declared, buffered = self.buf.len(), "frame complete");
        Ok(Some(payload))
    }

    /// Search only the bytes not yet scanned, keeping enough trailing context to catch a
    /// delimiter split across reads.
    fn find_delimiter(&mut self) -> Option<usize> {
        let start = self.scanned;
        let found = self.buf[start..]
            .windows(DELIMITER.len())
            .position(|window| window == DELIMITER)
            .map(|pos| pos + start);
        if found.is_none() {
            self.scanned = self.buf.len().saturating_sub(DELIMITER.len() - 1);
        }
        found
    }

    /// Declared length of the frame in progress, once its header has been parsed.
    pub fn declared_len(&self) -> Option<usize> {
        self.declared
    }

    /// Bytes received but not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True when no partial frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.declared.is_none() && self.buf.is_empty()
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Update maximum payload size for subsequent headers.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_in_chunks(wire: &[u8], chunk: usize, config: FrameConfig) -> Vec<Bytes> {
        let mut decoder = FrameDecoder::with_config(config);
        let mut out = Vec::new();
        for piece in wire.chunks(chunk) {
            decoder.extend(piece);
            while let Some(payload) = decoder.decode().unwrap() {
                out.push(payload);
            }
        }
        assert!(decoder.is_idle());
        out
    }

    #[test]
    fn encode_ping() {
        assert_eq!(encode(b"ping").as_ref(), b"Content-Length: 4\r\n\r\nping");
        assert_eq!(encoded_len(4), 22);
        assert_eq!(Frame::new("ping").wire_size(), 22);
    }

    #[test]
    fn encode_appends_to_existing_buffer() {
        let mut buf = BytesMut::from(&b"xx"[..]);
        encode_frame(&[0u8; 1234], &mut buf);
        assert!(buf.starts_with(b"xxContent-Length: 1234\r\n\r\n"));
        assert_eq!(buf.len(), 2 + encoded_len(1234));
    }

    #[test]
    fn decimal_digit_count() {
        assert_eq!(decimal_digits(0), 1);
        assert_eq!(decimal_digits(9), 1);
        assert_eq!(decimal_digits(10), 2);
        assert_eq!(decimal_digits(100_000), 6);
    }

    #[test]
    fn decode_in_two_chunks() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"Content-Length: 4\r\n\r\npi");
        assert_eq!(decoder.decode().unwrap(), None);
        assert_eq!(decoder.declared_len(), Some(4));

        decoder.extend(b"ng");
        assert_eq!(decoder.decode().unwrap().unwrap().as_ref(), b"ping");
        assert!(decoder.is_idle());
    }

    #[test]
    fn every_chunk_size_roundtrips() {
        let payloads: [&[u8]; 4] = [
            b"x",
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":null}",
            b"body with \r\n\r\n inside and Content-Length: 99",
            &[0u8, 255, 13, 10, 13, 10, 7],
        ];
        let mut wire = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut wire);
        }

        for chunk in 1..=wire.len() {
            let decoded = feed_in_chunks(&wire, chunk, FrameConfig::default());
            let decoded: Vec<&[u8]> = decoded.iter().map(|b| b.as_ref()).collect();
            assert_eq!(decoded, payloads, "chunk size {chunk}");
        }
    }

    #[test]
    fn empty_payload_requires_opt_in() {
        let wire = encode(b"");
        assert_eq!(wire.as_ref(), b"Content-Length: 0\r\n\r\n");

        let mut strict = FrameDecoder::new();
        strict.extend(&wire);
        assert!(matches!(strict.decode(), Err(FrameError::InvalidLength(_))));

        let config = FrameConfig {
            allow_empty: true,
            ..FrameConfig::default()
        };
        let decoded = feed_in_chunks(&wire, 1, config);
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].is_empty());
    }

    #[test]
    fn split_delimiter_is_found() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"Content-Length: 3\r");
        assert_eq!(decoder.decode().unwrap(), None);
        decoder.extend(b"\n\r");
        assert_eq!(decoder.decode().unwrap(), None);
        decoder.extend(b"\nabc");
        assert_eq!(decoder.decode().unwrap().unwrap().as_ref(), b"abc");
    }

    #[test]
    fn back_to_back_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"Content-Length: 3\r\n\r\noneContent-Length: 3\r\n\r\ntwo");
        assert_eq!(decoder.decode().unwrap().unwrap().as_ref(), b"one");
        assert_eq!(decoder.declared_len(), None);
        assert_eq!(decoder.decode().unwrap().unwrap().as_ref(), b"two");
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn bad_header_prefix() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"Bad-Header: 5\r\n\r\nhello");
        let err = decoder.decode().unwrap_err();
        assert!(matches!(err, FrameError::InvalidHeader(_)));
        assert!(err.is_protocol_corruption());
    }

    #[test]
    fn header_is_case_sensitive() {
        let config = FrameConfig::default();
        assert!(matches!(
            parse_header(b"content-length: 5", &config),
            Err(FrameError::InvalidHeader(_))
        ));
        assert!(matches!(
            parse_header(b"Content-Length:5", &config),
            Err(FrameError::InvalidHeader(_))
        ));
    }

    #[test]
    fn extra_headers_are_rejected() {
        let config = FrameConfig::default();
        let err = parse_header(
            b"Content-Length: 5\r\nContent-Type: application/vscode-jsonrpc",
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::InvalidHeader(_)));
    }

    #[test]
    fn length_must_be_positive_decimal() {
        let config = FrameConfig::default();
        let bad_headers: [&[u8]; 7] = [
            b"Content-Length: ",
            b"Content-Length: 0",
            b"Content-Length: -5",
            b"Content-Length: +5",
            b"Content-Length: 5 ",
            b"Content-Length: 0x10",
            b"Content-Length: 99999999999999999999999999",
        ];
        for bad in bad_headers {
            assert!(
                matches!(parse_header(bad, &config), Err(FrameError::InvalidLength(_))),
                "{:?}",
                String::from_utf8_lossy(bad)
            );
        }
        assert_eq!(parse_header(b"Content-Length: 007", &config).unwrap(), 7);
    }

    #[test]
    fn declared_length_above_limit() {
        let config = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let err = parse_header(b"Content-Length: 17", &config).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 17, max: 16 }));
    }

    #[test]
    fn header_without_delimiter_is_bounded() {
        let config = FrameConfig {
            max_header_size: 32,
            ..FrameConfig::default()
        };
        let mut decoder = FrameDecoder::with_config(config);
        decoder.extend(&[b'a'; 30]);
        assert_eq!(decoder.decode().unwrap(), None);
        decoder.extend(&[b'a'; 30]);
        assert!(matches!(
            decoder.decode(),
            Err(FrameError::HeaderTooLarge { max: 32, .. })
        ));
    }

    #[test]
    fn read_sizes_follow_phase() {
        let config = FrameConfig {
            read_chunk_size: 100,
            ..FrameConfig::default()
        };
        let mut decoder = FrameDecoder::with_config(config);
        assert_eq!(decoder.next_read_size(), HEADER_READ_SIZE);

        decoder.extend(b"Content-Length: 250\r\n\r\nabc");
        assert_eq!(decoder.decode().unwrap(), None);
        assert_eq!(decoder.next_read_size(), 100);

        decoder.extend(&[b'z'; 200]);
        assert_eq!(decoder.decode().unwrap(), None);
        assert_eq!(decoder.next_read_size(), 47);
    }

    #[test]
    fn frame_accessors() {
        let frame = Frame::from(Bytes::from_static(b"text"));
        assert_eq!(frame.as_utf8(), Some("text"));
        assert_eq!(frame.clone().into_payload().as_ref(), b"text");
        assert_eq!(Frame::new(vec![0xFF, 0xFE]).as_utf8(), None);
    }
}
