use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::codec::{FrameConfig, SlipDecoder};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete datagrams from any `Read` stream carrying SLIP frames.
///
/// Handles partial reads internally; callers always get complete datagrams.
pub struct FrameReader<T> {
    inner: T,
    decoder: SlipDecoder,
    ready: VecDeque<Bytes>,
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
            decoder: SlipDecoder::with_config(&config),
            ready: VecDeque::new(),
        }
    }

    /// Read the next complete datagram (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached; a
    /// trailing unterminated frame is discarded.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            let ready = &mut self.ready;
            self.decoder
                .push(&chunk[..read], |frame| ready.push_back(frame));
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Bytes>;

    /// Yields datagrams until the stream closes.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            Err(FrameError::ConnectionClosed) => None,
            other => Some(other),
        }
    }
}
