//! SLIP byte-stuffed framing over byte-oriented transports.
//!
//! Every datagram goes on the wire as `END <stuffed payload> END`, where
//! `END` and `ESC` inside the payload are replaced by two-byte escapes
//! (RFC 1055 values). There is no length field and no checksum.
//!
//! Inbound bytes may arrive in any chunking; [`SlipDecoder`] keeps the
//! partial frame and escape state between chunks. [`Framer`] binds an
//! encoder and a decoder to one [`sliplink_transport::Transport`].

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod framer;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::SlipCodec;
pub use codec::{
    encode, encode_frame, encoded_len, DecodeReport, FrameConfig, SlipDecoder,
    DEFAULT_MAX_FRAME_LEN, END, ESC, ESC_END, ESC_ESC,
};
pub use error::{FrameError, HandlerError, Result};
pub use framer::{FrameHandler, Framer, FramerStats};
pub use reader::FrameReader;
pub use writer::FrameWriter;
