use std::path::PathBuf;

/// Errors that can occur in link layer operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No links were configured.
    #[error("link layer needs at least one link")]
    NoLinks,

    /// The same next hop was bound to more than one transport.
    #[error("next hop {0} is configured more than once")]
    DuplicateNextHop(String),

    /// No link reaches the requested next hop.
    #[error("unknown next hop {0}")]
    UnknownNextHop(String),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] sliplink_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sliplink_transport::TransportError),

    /// The configuration is well-formed JSON but not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read a configuration file.
    #[error("failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
