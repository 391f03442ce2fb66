//! `tokio_util::codec` adapter for SLIP framing.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, FrameConfig, SlipDecoder};
use crate::error::FrameError;

/// SLIP codec for `FramedRead` / `FramedWrite` / `Framed`.
///
/// Decoding consumes input eagerly into an internal [`SlipDecoder`], so a
/// partial frame at end of stream is dropped rather than reported.
#[derive(Debug, Default)]
pub struct SlipCodec {
    decoder: SlipDecoder,
}

impl SlipCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            decoder: SlipDecoder::with_config(config),
        }
    }
}

impl Decoder for SlipCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut completed = None;
        for (i, &byte) in src.iter().enumerate() {
            if let Some(frame) = self.decoder.decode_byte(byte) {
                completed = Some((i + 1, frame));
                break;
            }
        }

        match completed {
            Some((consumed, frame)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for SlipCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst);
        Ok(())
    }
}

impl<'a> Encoder<&'a [u8]> for SlipCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &'a [u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item, dst);
        Ok(())
    }
}
