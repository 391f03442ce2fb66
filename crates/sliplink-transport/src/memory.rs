use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{ReceiveHandler, Transport};

/// Synchronous in-process line.
///
/// Bytes transmitted on one end are pushed straight into the receive handler
/// of the other end, on the caller's thread. Bytes that arrive before a
/// handler is installed are held and flushed on installation, the way a real
/// pipe would buffer them.
///
/// A handler may transmit from inside its own call, including replies that
/// come straight back to the same end. Bytes that reach an end while its
/// handler is running are queued and handed over, in order, once the running
/// call returns; an end never runs its handler twice at once.
///
/// Every transmitted chunk is also recorded so tests can inspect the wire.
pub struct MemoryLine {
    local: Arc<Endpoint>,
    remote: Option<Weak<Endpoint>>,
}

#[derive(Default)]
struct Endpoint {
    inbox: Mutex<Inbox>,
    transmitted: Mutex<Vec<Vec<u8>>>,
}

#[derive(Default)]
struct Inbox {
    handler: Option<ReceiveHandler>,
    pending: Vec<u8>,
    delivering: bool,
}

impl MemoryLine {
    /// A line with no remote end. Transmits are recorded and otherwise dropped.
    pub fn new() -> Self {
        Self {
            local: Arc::new(Endpoint::default()),
            remote: None,
        }
    }

    /// Two connected ends of one line.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Endpoint::default());
        let b = Arc::new(Endpoint::default());
        let left = Self {
            local: Arc::clone(&a),
            remote: Some(Arc::downgrade(&b)),
        };
        let right = Self {
            local: b,
            remote: Some(Arc::downgrade(&a)),
        };
        (left, right)
    }

    /// Push raw bytes into this end as if they had arrived from the wire.
    pub fn inject(&self, bytes: &[u8]) {
        self.local.deliver(bytes);
    }

    /// Every chunk transmitted from this end, in order.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        lock(&self.local.transmitted).clone()
    }

    /// All bytes transmitted from this end, concatenated.
    pub fn transmitted_bytes(&self) -> Vec<u8> {
        lock(&self.local.transmitted).concat()
    }

    /// Forget the transmit history.
    pub fn clear_transmitted(&self) {
        lock(&self.local.transmitted).clear();
    }
}

impl Default for MemoryLine {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryLine {
    fn transmit(&self, bytes: &[u8]) -> Result<()> {
        lock(&self.local.transmitted).push(bytes.to_vec());

        let Some(remote) = &self.remote else {
            trace!(len = bytes.len(), "memory line has no remote end, dropping");
            return Ok(());
        };
        let remote = remote.upgrade().ok_or(TransportError::Closed)?;
        remote.deliver(bytes);
        Ok(())
    }

    fn set_receive_handler(&self, handler: ReceiveHandler) {
        let mut inbox = lock(&self.local.inbox);
        inbox.handler = Some(handler);
        self.local.drain(inbox);
    }
}

impl Endpoint {
    fn deliver(&self, bytes: &[u8]) {
        let mut inbox = lock(&self.inbox);
        inbox.pending.extend_from_slice(bytes);
        self.drain(inbox);
    }

    /// Hand pending bytes to the handler until none are left.
    ///
    /// The handler is taken out of the inbox for the duration of each call,
    /// so it can transmit (and be delivered to) without holding the lock. A
    /// handler installed during the call replaces the one taken out.
    fn drain<'a>(&'a self, mut inbox: MutexGuard<'a, Inbox>) {
        if inbox.delivering {
            trace!(queued = inbox.pending.len(), "delivery in progress, queued");
            return;
        }

        while !inbox.pending.is_empty() {
            let Some(mut handler) = inbox.handler.take() else {
                break;
            };
            let chunk = std::mem::take(&mut inbox.pending);
            inbox.delivering = true;
            drop(inbox);

            let unwind = ResetOnUnwind { inbox: &self.inbox };
            handler(&chunk);
            drop(unwind);

            inbox = lock(&self.inbox);
            inbox.delivering = false;
            if inbox.handler.is_none() {
                inbox.handler = Some(handler);
            }
        }
    }
}

/// Reopens an endpoint whose handler panicked; the handler itself is lost.
struct ResetOnUnwind<'a> {
    inbox: &'a Mutex<Inbox>,
}

impl Drop for ResetOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.inbox).delivering = false;
        }
    }
}

impl std::fmt::Debug for MemoryLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLine")
            .field("connected", &self.remote.is_some())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collector() -> (Arc<Mutex<Vec<u8>>>, ReceiveHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: ReceiveHandler = Box::new(move |bytes: &[u8]| {
            sink.lock().unwrap().extend_from_slice(bytes);
        });
        (seen, handler)
    }

    #[test]
    fn pair_delivers_to_remote_end() {
        let (left, right) = MemoryLine::pair();
        let (seen, handler) = collector();
        right.set_receive_handler(handler);

        left.transmit(b"abc").unwrap();
        left.transmit(b"def").unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), b"abcdef");
        assert_eq!(left.transmitted(), vec![b"abc".to_vec(), b"def".to_vec()]);
        assert!(right.transmitted().is_empty());
    }

    #[test]
    fn bytes_before_handler_are_buffered() {
        let (left, right) = MemoryLine::pair();
        left.transmit(b"early").unwrap();

        let (seen, handler) = collector();
        right.set_receive_handler(handler);
        left.transmit(b"-late").unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), b"early-late");
    }

    #[test]
    fn unconnected_line_records_only() {
        let line = MemoryLine::new();
        line.transmit(b"x").unwrap();
        line.transmit(b"yz").unwrap();
        assert_eq!(line.transmitted_bytes(), b"xyz");

        line.clear_transmitted();
        assert!(line.transmitted().is_empty());
    }

    #[test]
    fn inject_reaches_local_handler() {
        let line = MemoryLine::new();
        let (seen, handler) = collector();
        line.set_receive_handler(handler);

        line.inject(b"wire");
        assert_eq!(seen.lock().unwrap().as_slice(), b"wire");
    }

    #[test]
    fn replacing_handler_redirects_delivery() {
        let line = MemoryLine::new();
        let (first, handler) = collector();
        line.set_receive_handler(handler);
        line.inject(b"1");

        let (second, handler) = collector();
        line.set_receive_handler(handler);
        line.inject(b"2");

        assert_eq!(first.lock().unwrap().as_slice(), b"1");
        assert_eq!(second.lock().unwrap().as_slice(), b"2");
    }

    #[test]
    fn transmit_after_remote_dropped_is_closed() {
        let (left, right) = MemoryLine::pair();
        drop(right);
        let err = left.transmit(b"gone").unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn handlers_may_reply_synchronously() {
        let (left, right) = MemoryLine::pair();
        let left = Arc::new(left);
        let right = Arc::new(right);
        let left_seen = Arc::new(Mutex::new(Vec::new()));
        let right_seen = Arc::new(Mutex::new(Vec::new()));

        // right answers every request, left acknowledges every answer.
        {
            let right_tx = Arc::clone(&right);
            let seen = Arc::clone(&right_seen);
            right.set_receive_handler(Box::new(move |bytes: &[u8]| {
                seen.lock().unwrap().push(bytes.to_vec());
                if bytes == b"request" {
                    right_tx.transmit(b"reply").unwrap();
                }
            }));
        }
        {
            let left_tx = Arc::clone(&left);
            let seen = Arc::clone(&left_seen);
            left.set_receive_handler(Box::new(move |bytes: &[u8]| {
                seen.lock().unwrap().push(bytes.to_vec());
                left_tx.transmit(b"ack").unwrap();
            }));
        }

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let sender = Arc::clone(&left);
        std::thread::spawn(move || {
            sender.transmit(b"request").unwrap();
            let _ = done_tx.send(());
        });
        done_rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("request/reply/ack chain should complete");

        assert_eq!(*left_seen.lock().unwrap(), vec![b"reply".to_vec()]);
        assert_eq!(
            *right_seen.lock().unwrap(),
            vec![b"request".to_vec(), b"ack".to_vec()]
        );
    }

    #[test]
    fn handler_replaced_during_delivery_takes_over() {
        let line = Arc::new(MemoryLine::new());
        let (second, replacement) = collector();
        let replacement = Mutex::new(Some(replacement));
        let inner = Arc::clone(&line);
        line.set_receive_handler(Box::new(move |bytes: &[u8]| {
            assert_eq!(bytes, b"first");
            if let Some(handler) = replacement.lock().unwrap().take() {
                inner.set_receive_handler(handler);
                inner.inject(b"second");
            }
        }));

        line.inject(b"first");
        assert_eq!(second.lock().unwrap().as_slice(), b"second");
    }

    #[test]
    fn panicking_handler_does_not_wedge_the_line() {
        let line = MemoryLine::new();
        line.set_receive_handler(Box::new(|_: &[u8]| panic!("handler bug")));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| line.inject(b"x")));
        assert!(result.is_err());

        let (seen, handler) = collector();
        line.set_receive_handler(handler);
        line.inject(b"after");
        assert_eq!(seen.lock().unwrap().as_slice(), b"after");
    }
}
