//! SLIP link layer for moving datagrams over serial lines and sockets.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte transport abstraction (in-memory pipe, TCP, Unix socket, serial device)
//! - [`frame`]: SLIP byte stuffing, incremental reassembly, and the per-link `Framer`
//! - [`link`]: Next-hop routing across links (behind `link` feature)

/// Re-export transport types.
pub mod transport {
    pub use sliplink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sliplink_frame::*;
}

/// Re-export link layer types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use sliplink_link::*;
}
