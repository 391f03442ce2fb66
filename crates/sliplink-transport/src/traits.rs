use std::sync::Arc;

use crate::error::Result;

/// Callback receiving raw inbound bytes from a transport.
///
/// Called with chunks of any length, in wire order, never concurrently with
/// itself for the same transport.
pub type ReceiveHandler = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// A byte-oriented channel to exactly one adjacent node.
pub trait Transport: Send + Sync {
    /// Hand `bytes` to the wire. Ordering between calls is preserved.
    fn transmit(&self, bytes: &[u8]) -> Result<()>;

    /// Install the inbound byte handler, replacing any previous one.
    fn set_receive_handler(&self, handler: ReceiveHandler);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn transmit(&self, bytes: &[u8]) -> Result<()> {
        (**self).transmit(bytes)
    }

    fn set_receive_handler(&self, handler: ReceiveHandler) {
        (**self).set_receive_handler(handler)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&self, bytes: &[u8]) -> Result<()> {
        (**self).transmit(bytes)
    }

    fn set_receive_handler(&self, handler: ReceiveHandler) {
        (**self).set_receive_handler(handler)
    }
}
