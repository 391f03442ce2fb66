use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::{Bytes, BytesMut};
use sliplink_transport::Transport;
use tracing::{trace, warn};

use crate::codec::{encode_frame, encoded_len, DecodeReport, FrameConfig, SlipDecoder};
use crate::error::{HandlerError, Result};

/// Callback invoked once per reassembled datagram.
pub type FrameHandler = Arc<dyn Fn(Bytes) -> std::result::Result<(), HandlerError> + Send + Sync>;

type HandlerSlot = Arc<RwLock<Option<FrameHandler>>>;

/// SLIP framing bound to exactly one transport.
///
/// Outbound, [`Framer::send`] stuffs a datagram and hands the frame to the
/// transport in a single transmit. Inbound, the decoder is moved into the
/// transport's receive handler, so reassembly state is owned by the receive
/// path alone and survives arbitrary chunking.
///
/// Each completed frame is passed to the registered handler at a dispatch
/// boundary: an `Err` or a panic from the handler is logged and counted, and
/// decoding continues with the next byte.
pub struct Framer {
    transport: Arc<dyn Transport>,
    handler: HandlerSlot,
    counters: Arc<Counters>,
}

/// Point-in-time counters for one framer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Complete non-empty frames reassembled.
    pub frames_received: u64,
    /// Frames that arrived while no handler was registered.
    pub frames_discarded: u64,
    pub handler_failures: u64,
    pub invalid_escapes: u64,
    pub oversized_frames: u64,
}

#[derive(Default)]
struct Counters {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_discarded: AtomicU64,
    handler_failures: AtomicU64,
    invalid_escapes: AtomicU64,
    oversized_frames: AtomicU64,
}

impl Framer {
    /// Bind a framer to `transport` with default configuration.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, FrameConfig::default())
    }

    /// Bind a framer to `transport` with explicit configuration.
    pub fn with_config(transport: impl Transport + 'static, config: FrameConfig) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let handler: HandlerSlot = Arc::new(RwLock::new(None));
        let counters = Arc::new(Counters::default());

        let mut decoder = SlipDecoder::with_config(&config);
        let slot = Arc::clone(&handler);
        let stats = Arc::clone(&counters);
        transport.set_receive_handler(Box::new(move |chunk: &[u8]| {
            let report = decoder.push(chunk, |frame| dispatch(&slot, &stats, frame));
            stats.record_decode(&report);
        }));

        Self {
            transport,
            handler,
            counters,
        }
    }

    /// Register the frame handler, replacing any previous one.
    pub fn register_receiver<F>(&self, handler: F)
    where
        F: Fn(Bytes) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.set_handler(Some(Arc::new(handler)));
    }

    /// Install an already shared handler, or clear it with `None`.
    pub fn set_handler(&self, handler: Option<FrameHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    /// Encode `datagram` and transmit it as one frame.
    pub fn send(&self, datagram: &[u8]) -> Result<()> {
        let mut frame = BytesMut::with_capacity(encoded_len(datagram));
        encode_frame(datagram, &mut frame);
        self.transport.transmit(&frame)?;

        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        trace!(payload = datagram.len(), wire = frame.len(), "frame sent");
        Ok(())
    }

    /// Snapshot of this framer's counters.
    pub fn stats(&self) -> FramerStats {
        self.counters.snapshot()
    }

    /// The transport this framer owns.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl std::fmt::Debug for Framer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn dispatch(slot: &HandlerSlot, counters: &Counters, frame: Bytes) {
    counters.frames_received.fetch_add(1, Ordering::Relaxed);

    // Clone out of the slot so the handler may re-register without deadlocking.
    let handler = slot
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let Some(handler) = handler else {
        counters.frames_discarded.fetch_add(1, Ordering::Relaxed);
        trace!(len = frame.len(), "no frame handler registered, discarding");
        return;
    };

    let len = frame.len();
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler(frame))) {
        Ok(Ok(())) => trace!(len, "frame delivered"),
        Ok(Err(err)) => {
            counters.handler_failures.fetch_add(1, Ordering::Relaxed);
            warn!(len, error = %err, "frame handler failed");
        }
        Err(_) => {
            counters.handler_failures.fetch_add(1, Ordering::Relaxed);
            warn!(len, "frame handler panicked");
        }
    }
}

impl Counters {
    fn record_decode(&self, report: &DecodeReport) {
        if report.invalid_escapes > 0 {
            self.invalid_escapes
                .fetch_add(report.invalid_escapes, Ordering::Relaxed);
        }
        if report.oversized_frames > 0 {
            self.oversized_frames
                .fetch_add(report.oversized_frames, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> FramerStats {
        FramerStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            invalid_escapes: self.invalid_escapes.load(Ordering::Relaxed),
            oversized_frames: self.oversized_frames.load(Ordering::Relaxed),
        }
    }
}
