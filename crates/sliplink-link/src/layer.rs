use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use bytes::Bytes;
use sliplink_frame::{FrameConfig, Framer, FramerStats, HandlerError};
use sliplink_transport::Transport;
use tracing::{debug, trace, warn};

use crate::error::{LinkError, Result};

/// Upper-layer callback invoked once per reassembled datagram.
pub type DatagramHandler =
    Arc<dyn Fn(Bytes) -> std::result::Result<(), HandlerError> + Send + Sync>;

/// Routes datagrams to per-link framers by next-hop address.
///
/// The registry is fixed at construction. Every framer relays into the same
/// receiver slot; relay calls are serialized so the receiver never sees two
/// overlapping invocations, even when links are driven from different
/// threads. Ordering is preserved per link only.
///
/// A receiver may send synchronously, and replies that come back into this
/// layer during the call are delivered right after it returns.
pub struct LinkLayer<A> {
    links: HashMap<A, Framer>,
    relay: Arc<Relay>,
    ignore_checksum: bool,
}

#[derive(Default)]
struct Relay {
    receiver: RwLock<Option<DatagramHandler>>,
    dispatch: Mutex<Dispatch>,
    idle: Condvar,
}

#[derive(Default)]
struct Dispatch {
    owner: Option<ThreadId>,
    deferred: VecDeque<Bytes>,
}

impl<A> LinkLayer<A>
where
    A: Eq + Hash + Display,
{
    /// Build a layer with one framer per `(next_hop, transport)` pair.
    ///
    /// Fails with [`LinkError::NoLinks`] on an empty set and with
    /// [`LinkError::DuplicateNextHop`] when a next hop repeats.
    pub fn new<I, T>(channels: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, T)>,
        T: Transport + 'static,
    {
        Self::with_config(channels, FrameConfig::default())
    }

    /// Build a layer with explicit framing configuration for every link.
    pub fn with_config<I, T>(channels: I, config: FrameConfig) -> Result<Self>
    where
        I: IntoIterator<Item = (A, T)>,
        T: Transport + 'static,
    {
        let relay = Arc::new(Relay::default());
        let mut links = HashMap::new();

        for (next_hop, transport) in channels {
            match links.entry(next_hop) {
                Entry::Occupied(entry) => {
                    return Err(LinkError::DuplicateNextHop(entry.key().to_string()));
                }
                Entry::Vacant(entry) => {
                    let framer = Framer::with_config(transport, config.clone());
                    let relay = Arc::clone(&relay);
                    framer.register_receiver(move |datagram| relay.deliver(datagram));
                    debug!(next_hop = %entry.key(), "link attached");
                    entry.insert(framer);
                }
            }
        }

        if links.is_empty() {
            return Err(LinkError::NoLinks);
        }

        Ok(Self {
            links,
            relay,
            ignore_checksum: false,
        })
    }

    /// Set the flag telling the upper layer to skip datagram checksums.
    pub fn with_ignore_checksum(mut self, ignore: bool) -> Self {
        self.ignore_checksum = ignore;
        self
    }

    /// Whether the upper layer should skip datagram checksums. Default: `false`.
    pub fn ignore_checksum(&self) -> bool {
        self.ignore_checksum
    }

    /// Register the upward receiver, replacing any previous one.
    ///
    /// Datagrams that complete while no receiver is registered are dropped.
    pub fn register_receiver<F>(&self, receiver: F)
    where
        F: Fn(Bytes) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.relay.set(Some(Arc::new(receiver)));
    }

    /// Remove the upward receiver.
    pub fn clear_receiver(&self) {
        self.relay.set(None);
    }

    /// Frame `datagram` onto the link that reaches `next_hop`.
    ///
    /// Fails with [`LinkError::UnknownNextHop`] without transmitting anything
    /// when no link is bound to `next_hop`.
    pub fn send<Q>(&self, datagram: &[u8], next_hop: &Q) -> Result<()>
    where
        A: Borrow<Q>,
        Q: Hash + Eq + Display + ?Sized,
    {
        let framer = self
            .links
            .get(next_hop)
            .ok_or_else(|| LinkError::UnknownNextHop(next_hop.to_string()))?;
        framer.send(datagram)?;
        trace!(%next_hop, len = datagram.len(), "datagram sent");
        Ok(())
    }

    /// Configured next hops, in no particular order.
    pub fn next_hops(&self) -> impl Iterator<Item = &A> {
        self.links.keys()
    }

    /// The transport under the link serving `next_hop`.
    pub fn transport<Q>(&self, next_hop: &Q) -> Option<&dyn Transport>
    where
        A: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.links.get(next_hop).map(Framer::transport)
    }

    /// Counters for the link serving `next_hop`.
    pub fn stats<Q>(&self, next_hop: &Q) -> Option<FramerStats>
    where
        A: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.links.get(next_hop).map(Framer::stats)
    }

    /// Number of configured links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Always `false` for a constructed layer.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl Relay {
    fn set(&self, receiver: Option<DatagramHandler>) {
        *self.receiver.write().unwrap_or_else(PoisonError::into_inner) = receiver;
    }

    /// Hand `datagram` to the receiver, one call at a time.
    ///
    /// The first thread in owns the relay until the queue is empty. A
    /// datagram relayed from inside a receiver call (a synchronous reply
    /// looping back over another link) is queued and delivered by the owner
    /// after the current call returns. Other threads wait their turn.
    fn deliver(&self, datagram: Bytes) -> std::result::Result<(), HandlerError> {
        let me = thread::current().id();
        let mut state = lock(&self.dispatch);
        if state.owner == Some(me) {
            trace!(len = datagram.len(), "relay busy on this thread, deferring datagram");
            state.deferred.push_back(datagram);
            return Ok(());
        }
        while state.owner.is_some() {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        drop(state);

        let _release = Release { relay: self };
        let result = self.call(datagram);
        loop {
            let Some(next) = self.next_deferred() else {
                break;
            };
            if let Err(err) = self.call(next) {
                warn!(error = %err, "receiver failed on deferred datagram");
            }
        }
        result
    }

    fn next_deferred(&self) -> Option<Bytes> {
        lock(&self.dispatch).deferred.pop_front()
    }

    fn call(&self, datagram: Bytes) -> std::result::Result<(), HandlerError> {
        let receiver = self
            .receiver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match receiver {
            Some(receiver) => receiver(datagram),
            None => {
                trace!(len = datagram.len(), "no receiver registered, dropping datagram");
                Ok(())
            }
        }
    }
}

/// Gives up relay ownership, also when a receiver panics.
struct Release<'a> {
    relay: &'a Relay,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        lock(&self.relay.dispatch).owner = None;
        self.relay.idle.notify_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<A: Debug> Debug for LinkLayer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkLayer")
            .field("links", &self.links.keys().collect::<Vec<_>>())
            .field("ignore_checksum", &self.ignore_checksum)
            .finish()
    }
}
