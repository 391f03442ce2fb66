//! Byte-oriented transport channel abstraction.
//!
//! A transport moves raw bytes and nothing else: [`Transport::transmit`]
//! hands bytes to the wire, and inbound bytes are pushed to a single
//! registered [`ReceiveHandler`] in arbitrarily sized chunks. Chunk
//! boundaries carry no meaning.
//!
//! Implementations:
//! - [`MemoryLine`]: synchronous in-process pipe, used for simulation and tests
//! - [`StreamLine`]: any `Read + Write` stream (TCP, Unix socket, serial device)

pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::MemoryLine;
pub use stream::StreamLine;
pub use traits::{ReceiveHandler, Transport};
