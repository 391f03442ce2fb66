use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

/// Frame delimiter.
pub const END: u8 = 0xC0;

/// Escape marker.
pub const ESC: u8 = 0xDB;

/// Escaped `END` (follows `ESC`).
pub const ESC_END: u8 = 0xDC;

/// Escaped `ESC` (follows `ESC`).
pub const ESC_ESC: u8 = 0xDD;

/// Default upper bound on a reassembled datagram: 16 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Configuration for frame reassembly.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest datagram the decoder will accumulate. Longer frames are
    /// dropped up to the next delimiter. Default: 16 MiB.
    pub max_frame_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Number of wire bytes `payload` occupies once framed.
pub fn encoded_len(payload: &[u8]) -> usize {
    let escapes = payload.iter().filter(|&&b| b == END || b == ESC).count();
    payload.len() + escapes + 2
}

/// Encode a datagram into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬───────────────────────────────────┬──────┐
/// │ END  │ payload, with                      │ END  │
/// │ 0xC0 │   0xC0 -> 0xDB 0xDC                │ 0xC0 │
/// │      │   0xDB -> 0xDB 0xDD                │      │
/// └──────┴───────────────────────────────────┴──────┘
/// ```
///
/// Every byte value is representable, so encoding cannot fail.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(encoded_len(payload));
    dst.put_u8(END);
    for &byte in payload {
        match byte {
            END => dst.put_slice(&[ESC, ESC_END]),
            ESC => dst.put_slice(&[ESC, ESC_ESC]),
            _ => dst.put_u8(byte),
        }
    }
    dst.put_u8(END);
}

/// Encode a datagram into a freshly allocated frame.
pub fn encode(payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(encoded_len(payload));
    encode_frame(payload, &mut dst);
    dst.freeze()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Escaping,
    /// Frame exceeded the size limit; drop bytes until the next `END`.
    Discarding,
}

/// What happened while decoding one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Complete, non-empty frames produced.
    pub frames: u64,
    /// `ESC` followed by something other than `ESC_END`/`ESC_ESC`.
    pub invalid_escapes: u64,
    /// Frames dropped for exceeding `max_frame_len`.
    pub oversized_frames: u64,
}

/// Incremental SLIP decoder.
///
/// Holds the in-progress frame and the escape flag across calls, so input
/// can be split at any byte boundary. Delimiters are checked before the
/// escape flag: an `END` that follows `ESC` closes the frame.
#[derive(Debug)]
pub struct SlipDecoder {
    buf: BytesMut,
    state: State,
    max_frame_len: usize,
}

impl SlipDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: State::Normal,
            max_frame_len: config.max_frame_len,
        }
    }

    /// Feed a chunk, calling `on_frame` once per completed datagram in order.
    pub fn push(&mut self, chunk: &[u8], mut on_frame: impl FnMut(Bytes)) -> DecodeReport {
        let mut report = DecodeReport::default();
        for &byte in chunk {
            if let Some(frame) = self.step(byte, &mut report) {
                report.frames += 1;
                on_frame(frame);
            }
        }
        report
    }

    /// Feed one byte. Returns a datagram when `byte` completes one.
    pub fn decode_byte(&mut self, byte: u8) -> Option<Bytes> {
        self.step(byte, &mut DecodeReport::default())
    }

    /// Bytes accumulated for the frame in progress.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Whether the previous byte was an unconsumed `ESC`.
    pub fn is_escaping(&self) -> bool {
        self.state == State::Escaping
    }

    /// Drop the frame in progress and return to the initial state.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = State::Normal;
    }

    fn step(&mut self, byte: u8, report: &mut DecodeReport) -> Option<Bytes> {
        if byte == END {
            let discarding = self.state == State::Discarding;
            self.state = State::Normal;
            if discarding || self.buf.is_empty() {
                self.buf.clear();
                return None;
            }
            return Some(self.buf.split().freeze());
        }

        let decoded = match self.state {
            State::Discarding => return None,
            State::Escaping => {
                self.state = State::Normal;
                match byte {
                    ESC_END => END,
                    ESC_ESC => ESC,
                    other => {
                        report.invalid_escapes += 1;
                        debug!(byte = other, "invalid escape sequence, keeping byte");
                        other
                    }
                }
            }
            State::Normal if byte == ESC => {
                self.state = State::Escaping;
                return None;
            }
            State::Normal => byte,
        };

        if self.buf.len() >= self.max_frame_len {
            warn!(
                max = self.max_frame_len,
                "frame exceeds maximum length, discarding until next delimiter"
            );
            report.oversized_frames += 1;
            self.buf.clear();
            self.state = State::Discarding;
            return None;
        }

        self.buf.put_u8(decoded);
        None
    }
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}
