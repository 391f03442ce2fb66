//! Multi-link layer over SLIP framers.
//!
//! A [`LinkLayer`] owns one [`sliplink_frame::Framer`] per transport, keyed
//! by the next-hop address reachable over it. Outbound datagrams are routed
//! by next hop; inbound datagrams from every link are relayed, one at a time,
//! to a single registered receiver.

pub mod config;
pub mod connector;
pub mod error;
pub mod layer;

pub use config::{Endpoint, LinkConfig, LinkEntry};
pub use connector::{open_endpoint, open_link_layer};
pub use error::{LinkError, Result};
pub use layer::{DatagramHandler, LinkLayer};
