use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, Frame, FrameConfig, FrameDecoder};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for `Content-Length` framing, backed by [`FrameDecoder`].
#[derive(Debug, Default)]
pub struct ContentLengthCodec {
    decoder: FrameDecoder,
}

impl ContentLengthCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::with_config(config),
        }
    }
}

impl Decoder for ContentLengthCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if !src.is_empty() {
            let received = src.split();
            self.decoder.extend(&received);
        }
        Ok(self.decoder.decode()?.map(Frame::from))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if self.decoder.is_idle() => Ok(None),
            None => Err(FrameError::Truncated {
                received: self.decoder.buffered(),
            }),
        }
    }
}

impl Encoder<Bytes> for ContentLengthCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, dst);
        Ok(())
    }
}

impl Encoder<Frame> for ContentLengthCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item.payload, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::encode;

    #[tokio::test]
    async fn framed_read_yields_payloads() {
        let mut wire = BytesMut::new();
        encode_frame(b"one", &mut wire);
        encode_frame(b"two", &mut wire);
        let wire = wire.freeze();

        let mut framed = FramedRead::new(&wire[..], ContentLengthCodec::new());
        let first = framed.next().await.unwrap().unwrap();
        let second = framed.next().await.unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"one");
        assert_eq!(second.payload.as_ref(), b"two");
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_read_reports_truncation() {
        let wire = b"Content-Length: 9\r\n\r\nabc".to_vec();
        let mut framed = FramedRead::new(&wire[..], ContentLengthCodec::new());
        let err = framed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Truncated { received: 3 }));
    }

    #[tokio::test]
    async fn framed_write_encodes() {
        let mut framed = FramedWrite::new(Vec::new(), ContentLengthCodec::new());
        framed.send(Bytes::from_static(b"ping")).await.unwrap();
        framed.send(Frame::new("pong")).await.unwrap();

        let mut expected = encode(b"ping").to_vec();
        expected.extend_from_slice(&encode(b"pong"));
        assert_eq!(framed.get_ref(), &expected);
    }
}
