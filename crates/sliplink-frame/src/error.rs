/// Errors that can occur while sending or reading frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying transport rejected the transmit.
    #[error("transport error: {0}")]
    Transport(#[from] sliplink_transport::TransportError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before another complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

/// Failure reported by a frame or datagram handler.
///
/// Handler failures are logged and counted by the caller that dispatched the
/// frame; they never reach the transport or the decoder.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, FrameError>;
