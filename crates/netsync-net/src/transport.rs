//! Transport abstraction
//!
//! The session only needs "send bytes to a peer on a channel" and a queue of
//! events. [`LoopbackHub`] provides an in-process implementation where every
//! endpoint owns an unbounded queue; ordering per sender, receiver and
//! channel is the queue's FIFO order.

use bytes::Bytes;
use netsync_core::PeerId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),
    #[error("Already connected to peer: {0}")]
    AlreadyConnected(PeerId),
}

/// Transport channel identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u8);

impl ChannelId {
    /// Channel used by the protocol's own messages
    pub const INTERNAL: ChannelId = ChannelId(0);
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Event from the transport layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    Packet {
        from: PeerId,
        channel: ChannelId,
        data: Bytes,
    },
}

/// Byte transport consumed by the session
pub trait Transport {
    /// Our own peer id on this transport
    fn local_id(&self) -> PeerId;

    fn send(&self, to: PeerId, channel: ChannelId, data: Bytes) -> Result<(), TransportError>;

    /// Drop the link to `peer`; both ends observe a disconnect
    fn disconnect(&self, peer: PeerId);

    /// Next queued event, if any
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

type Link = (PeerId, PeerId);

fn link(a: PeerId, b: PeerId) -> Link {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Default)]
struct HubInner {
    endpoints: RwLock<HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>>,
    links: RwLock<HashSet<Link>>,
}

/// In-process switchboard connecting loopback endpoints
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint for `id`
    pub fn endpoint(&self, id: PeerId) -> Result<LoopbackTransport, TransportError> {
        let mut endpoints = self.inner.endpoints.write();
        if endpoints.contains_key(&id) {
            return Err(TransportError::AlreadyConnected(id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        endpoints.insert(id, tx);
        Ok(LoopbackTransport {
            id,
            hub: self.clone(),
            rx,
        })
    }

    /// Link two endpoints; each receives a `Connected` event for the other
    pub fn connect(&self, a: PeerId, b: PeerId) -> Result<(), TransportError> {
        {
            let endpoints = self.inner.endpoints.read();
            for id in [a, b] {
                if !endpoints.contains_key(&id) {
                    return Err(TransportError::PeerNotFound(id));
                }
            }
        }
        if !self.inner.links.write().insert(link(a, b)) {
            return Err(TransportError::AlreadyConnected(b));
        }
        info!("loopback link {} <-> {}", a, b);
        self.notify(a, TransportEvent::Connected(b));
        self.notify(b, TransportEvent::Connected(a));
        Ok(())
    }

    /// Remove a link; returns whether it existed
    pub fn sever(&self, a: PeerId, b: PeerId) -> bool {
        if !self.inner.links.write().remove(&link(a, b)) {
            return false;
        }
        debug!("loopback link {} <-> {} severed", a, b);
        self.notify(a, TransportEvent::Disconnected(b));
        self.notify(b, TransportEvent::Disconnected(a));
        true
    }

    pub fn is_linked(&self, a: PeerId, b: PeerId) -> bool {
        self.inner.links.read().contains(&link(a, b))
    }

    fn notify(&self, to: PeerId, event: TransportEvent) {
        if let Some(tx) = self.inner.endpoints.read().get(&to) {
            // a dropped receiver just means the endpoint is gone
            let _ = tx.send(event);
        }
    }

    fn deliver(&self, from: PeerId, to: PeerId, channel: ChannelId, data: Bytes) -> Result<(), TransportError> {
        if !self.is_linked(from, to) {
            return Err(TransportError::PeerNotFound(to));
        }
        let endpoints = self.inner.endpoints.read();
        let tx = endpoints.get(&to).ok_or(TransportError::PeerNotFound(to))?;
        tx.send(TransportEvent::Packet { from, channel, data })
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn remove_endpoint(&self, id: PeerId) {
        let peers: Vec<PeerId> = self
            .inner
            .links
            .read()
            .iter()
            .filter_map(|&(a, b)| match (a == id, b == id) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect();
        for peer in peers {
            self.sever(id, peer);
        }
        self.inner.endpoints.write().remove(&id);
    }
}

/// One endpoint on a [`LoopbackHub`]
pub struct LoopbackTransport {
    id: PeerId,
    hub: LoopbackHub,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl LoopbackTransport {
    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }
}

impl Transport for LoopbackTransport {
    fn local_id(&self) -> PeerId {
        self.id
    }

    fn send(&self, to: PeerId, channel: ChannelId, data: Bytes) -> Result<(), TransportError> {
        self.hub.deliver(self.id, to, channel, data)
    }

    fn disconnect(&self, peer: PeerId) {
        self.hub.sever(self.id, peer);
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.hub.remove_endpoint(self.id);
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_and_deliver() {
        let hub = LoopbackHub::new();
        let mut server = hub.endpoint(PeerId::SERVER).unwrap();
        let mut client = hub.endpoint(PeerId(1)).unwrap();

        assert!(client.send(PeerId::SERVER, ChannelId::INTERNAL, Bytes::new()).is_err());
        hub.connect(PeerId::SERVER, PeerId(1)).unwrap();
        assert_eq!(server.poll_event(), Some(TransportEvent::Connected(PeerId(1))));
        assert_eq!(client.poll_event(), Some(TransportEvent::Connected(PeerId::SERVER)));

        client
            .send(PeerId::SERVER, ChannelId(2), Bytes::from_static(b"a"))
            .unwrap();
        client
            .send(PeerId::SERVER, ChannelId(2), Bytes::from_static(b"b"))
            .unwrap();
        for expected in [&b"a"[..], &b"b"[..]] {
            match server.poll_event() {
                Some(TransportEvent::Packet { from, channel, data }) => {
                    assert_eq!(from, PeerId(1));
                    assert_eq!(channel, ChannelId(2));
                    assert_eq!(&data[..], expected);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(server.poll_event().is_none());
    }

    #[test]
    fn test_disconnect_notifies_both_ends() {
        let hub = LoopbackHub::new();
        let mut server = hub.endpoint(PeerId::SERVER).unwrap();
        let mut client = hub.endpoint(PeerId(1)).unwrap();
        hub.connect(PeerId::SERVER, PeerId(1)).unwrap();
        server.poll_event();
        client.poll_event();

        server.disconnect(PeerId(1));
        assert_eq!(server.poll_event(), Some(TransportEvent::Disconnected(PeerId(1))));
        assert_eq!(client.poll_event(), Some(TransportEvent::Disconnected(PeerId::SERVER)));
        assert!(!hub.sever(PeerId::SERVER, PeerId(1)));
    }

    #[test]
    fn test_duplicate_endpoint_and_link() {
        let hub = LoopbackHub::new();
        let _a = hub.endpoint(PeerId(1)).unwrap();
        let _b = hub.endpoint(PeerId(2)).unwrap();
        assert!(matches!(hub.endpoint(PeerId(1)), Err(TransportError::AlreadyConnected(_))));
        assert!(matches!(hub.connect(PeerId(1), PeerId(9)), Err(TransportError::PeerNotFound(_))));
        hub.connect(PeerId(1), PeerId(2)).unwrap();
        assert!(hub.connect(PeerId(2), PeerId(1)).is_err());
    }

    #[test]
    fn test_dropped_endpoint_severs_links() {
        let hub = LoopbackHub::new();
        let mut server = hub.endpoint(PeerId::SERVER).unwrap();
        let client = hub.endpoint(PeerId(1)).unwrap();
        hub.connect(PeerId::SERVER, PeerId(1)).unwrap();
        server.poll_event();

        drop(client);
        assert_eq!(server.poll_event(), Some(TransportEvent::Disconnected(PeerId(1))));
        assert!(!hub.is_linked(PeerId::SERVER, PeerId(1)));
    }
}
