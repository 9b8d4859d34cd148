use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::codec::{decode_frame, encode_frame, FrameConfig};
use crate::error::FrameError;

/// `tokio_util` codec for the ipcbus frame format.
///
/// Items are unstuffed command bytes. Corrupted frames are logged and
/// skipped rather than ending the stream, matching the blocking receiver.
#[derive(Debug, Clone, Default)]
pub struct HdlcCodec {
    config: FrameConfig,
}

impl HdlcCodec {
    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for HdlcCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match decode_frame(src, &self.config) {
                Err(err) if err.is_frame_local() => {
                    warn!(error = %err, "dropping frame");
                }
                other => return other,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = self.decode(src)?;
        if frame.is_none() {
            // Whatever is left is an unterminated frame or a lone delimiter.
            src.clear();
        }
        Ok(frame)
    }
}

impl Encoder<&[u8]> for HdlcCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item, &self.config, dst)
    }
}

impl Encoder<Bytes> for HdlcCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, &self.config, dst)
    }
}
