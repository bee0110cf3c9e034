//! In-process transport backend.
//!
//! Every endpoint created from the same [`MemoryNetwork`] lives in one
//! shared hub. Packets are moved straight into the remote endpoint's event
//! queue, so both delivery modes are lossless and ordered. Endpoints are
//! addressed by port only; the IP part of an address is ignored.

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    Backend, Delivery, Endpoint, PeerId, PeerState, TransportError,
    TransportEvent,
};

const EPHEMERAL_START: u16 = 49152;

/// A shared in-memory network. Cheap to clone; clones share the same hub.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live endpoints in the hub.
    pub fn endpoint_count(&self) -> usize {
        lock(&self.hub).endpoints.len()
    }

    fn open(
        &self,
        port: Option<u16>,
        max_peers: usize,
        channels: usize,
    ) -> Result<MemoryEndpoint, TransportError> {
        let mut hub = lock(&self.hub);
        let port = match port {
            Some(port) if port != 0 => {
                if hub.bound.contains_key(&port) {
                    return Err(TransportError::AddressInUse(loopback(port)));
                }
                port
            }
            _ => hub.ephemeral_port(),
        };

        hub.next_endpoint += 1;
        let key = hub.next_endpoint;
        hub.bound.insert(port, key);
        hub.endpoints.insert(
            key,
            Slot {
                addr: loopback(port),
                max_peers,
                channels,
                next_peer: 0,
                peers: HashMap::new(),
                inbox: VecDeque::new(),
            },
        );
        tracing::debug!(port, max_peers, "memory endpoint opened");

        Ok(MemoryEndpoint {
            key,
            hub: Arc::clone(&self.hub),
        })
    }
}

impl Backend for MemoryNetwork {
    type Endpoint = MemoryEndpoint;

    fn create_server(
        &self,
        bind: SocketAddr,
        max_peers: usize,
        channels: usize,
    ) -> Result<MemoryEndpoint, TransportError> {
        self.open(Some(bind.port()), max_peers, channels)
    }

    fn create_client(
        &self,
        channels: usize,
    ) -> Result<MemoryEndpoint, TransportError> {
        self.open(None, 1, channels)
    }
}

#[derive(Default)]
struct Hub {
    endpoints: HashMap<u64, Slot>,
    bound: HashMap<u16, u64>,
    next_endpoint: u64,
    next_port: u16,
}

impl Hub {
    fn ephemeral_port(&mut self) -> u16 {
        loop {
            if self.next_port < EPHEMERAL_START {
                self.next_port = EPHEMERAL_START;
            }
            let port = self.next_port;
            self.next_port = self.next_port.wrapping_add(1);
            if !self.bound.contains_key(&port) {
                return port;
            }
        }
    }

    /// Removes the remote half of a link and tells the remote side.
    fn notify_remote_disconnect(&mut self, remote_endpoint: u64, remote_peer: PeerId) {
        if let Some(remote) = self.endpoints.get_mut(&remote_endpoint) {
            if remote.peers.remove(&remote_peer).is_some() {
                remote
                    .inbox
                    .push_back(TransportEvent::Disconnect { peer: remote_peer });
            }
        }
    }
}

struct Slot {
    addr: SocketAddr,
    max_peers: usize,
    channels: usize,
    next_peer: u64,
    peers: HashMap<PeerId, Link>,
    inbox: VecDeque<TransportEvent>,
}

impl Slot {
    fn mint_peer(&mut self) -> PeerId {
        self.next_peer += 1;
        PeerId::new(self.next_peer)
    }
}

struct Link {
    remote_endpoint: u64,
    remote_peer: PeerId,
    channels: usize,
    state: PeerState,
}

/// An endpoint attached to a [`MemoryNetwork`].
pub struct MemoryEndpoint {
    key: u64,
    hub: Arc<Mutex<Hub>>,
}

impl Endpoint for MemoryEndpoint {
    fn connect(
        &mut self,
        remote: SocketAddr,
        channels: usize,
    ) -> Result<PeerId, TransportError> {
        let mut hub = lock(&self.hub);
        let key = self.key;
        let target = hub.bound.get(&remote.port()).copied();

        let Some(local) = hub.endpoints.get_mut(&key) else {
            return Err(TransportError::CapacityReached(0));
        };
        if local.peers.len() >= local.max_peers {
            return Err(TransportError::CapacityReached(local.max_peers));
        }
        let channels = channels.min(local.channels);
        let peer = local.mint_peer();

        let mut accepted = None;
        if let Some(t) = target.filter(|t| *t != key) {
            if let Some(server) = hub.endpoints.get_mut(&t) {
                if server.peers.len() < server.max_peers {
                    let remote_peer = server.mint_peer();
                    let channels = channels.min(server.channels);
                    server.peers.insert(
                        remote_peer,
                        Link {
                            remote_endpoint: key,
                            remote_peer: peer,
                            channels,
                            state: PeerState::Connecting,
                        },
                    );
                    server
                        .inbox
                        .push_back(TransportEvent::Connect { peer: remote_peer });
                    accepted = Some((t, remote_peer, channels));
                }
            }
        }

        let Some(local) = hub.endpoints.get_mut(&key) else {
            return Err(TransportError::CapacityReached(0));
        };
        match accepted {
            Some((remote_endpoint, remote_peer, channels)) => {
                local.peers.insert(
                    peer,
                    Link {
                        remote_endpoint,
                        remote_peer,
                        channels,
                        state: PeerState::Connecting,
                    },
                );
                local.inbox.push_back(TransportEvent::Connect { peer });
                tracing::trace!(%peer, %remote, "memory connect accepted");
            }
            None => {
                // Nobody listening, or the listener is full.
                local.inbox.push_back(TransportEvent::Disconnect { peer });
                tracing::trace!(%peer, %remote, "memory connect refused");
            }
        }
        Ok(peer)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        let mut hub = lock(&self.hub);
        let slot = hub.endpoints.get_mut(&self.key)?;
        let event = slot.inbox.pop_front()?;
        match &event {
            TransportEvent::Connect { peer } => {
                if let Some(link) = slot.peers.get_mut(peer) {
                    link.state = PeerState::Connected;
                }
            }
            TransportEvent::Disconnect { peer } => {
                slot.peers.remove(peer);
            }
            TransportEvent::Receive { .. } => {}
        }
        Some(event)
    }

    fn send(
        &mut self,
        peer: PeerId,
        channel: u8,
        data: &[u8],
        _delivery: Delivery,
    ) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        let slot = hub
            .endpoints
            .get(&self.key)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let link = slot
            .peers
            .get(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        if link.state != PeerState::Connected {
            return Err(TransportError::PeerNotConnected(peer));
        }
        if usize::from(channel) >= link.channels {
            return Err(TransportError::ChannelOutOfRange {
                channel,
                channels: link.channels,
            });
        }
        let (remote_endpoint, remote_peer) =
            (link.remote_endpoint, link.remote_peer);

        if let Some(remote) = hub.endpoints.get_mut(&remote_endpoint) {
            if remote.peers.contains_key(&remote_peer) {
                remote.inbox.push_back(TransportEvent::Receive {
                    peer: remote_peer,
                    channel,
                    data: data.to_vec(),
                });
            }
        }
        Ok(())
    }

    fn disconnect_now(&mut self, peer: PeerId) {
        let mut hub = lock(&self.hub);
        let Some(slot) = hub.endpoints.get_mut(&self.key) else {
            return;
        };
        let Some(link) = slot.peers.remove(&peer) else {
            return;
        };
        slot.inbox.retain(|event| event.peer() != peer);
        hub.notify_remote_disconnect(link.remote_endpoint, link.remote_peer);
    }

    fn disconnect_later(&mut self, peer: PeerId) {
        let mut hub = lock(&self.hub);
        let Some(slot) = hub.endpoints.get_mut(&self.key) else {
            return;
        };
        let Some(link) = slot.peers.get_mut(&peer) else {
            return;
        };
        if link.state == PeerState::Disconnecting {
            return;
        }
        link.state = PeerState::Disconnecting;
        let (remote_endpoint, remote_peer) =
            (link.remote_endpoint, link.remote_peer);
        slot.inbox.push_back(TransportEvent::Disconnect { peer });

        // Everything already sent sits ahead of this in the remote queue.
        hub.notify_remote_disconnect(remote_endpoint, remote_peer);
    }

    fn peer_state(&self, peer: PeerId) -> PeerState {
        lock(&self.hub)
            .endpoints
            .get(&self.key)
            .and_then(|slot| slot.peers.get(&peer))
            .map_or(PeerState::Disconnected, |link| link.state)
    }

    fn flush(&mut self) {}

    fn local_addr(&self) -> SocketAddr {
        lock(&self.hub)
            .endpoints
            .get(&self.key)
            .map_or_else(|| loopback(0), |slot| slot.addr)
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        let mut hub = lock(&self.hub);
        let Some(slot) = hub.endpoints.remove(&self.key) else {
            return;
        };
        hub.bound.remove(&slot.addr.port());
        for link in slot.peers.values() {
            hub.notify_remote_disconnect(link.remote_endpoint, link.remote_peer);
        }
        tracing::debug!(addr = %slot.addr, "memory endpoint destroyed");
    }
}

fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_addr(port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
    }

    /// Polls until the endpoint reports nothing more.
    fn drain(endpoint: &mut MemoryEndpoint) -> Vec<TransportEvent> {
        std::iter::from_fn(|| endpoint.poll()).collect()
    }

    #[test]
    fn test_create_server_twice_on_same_port_returns_address_in_use() {
        let net = MemoryNetwork::new();
        let _first = net.create_server(server_addr(4000), 3, 2).unwrap();

        let result = net.create_server(server_addr(4000), 3, 2);

        assert!(matches!(result, Err(TransportError::AddressInUse(_))));
    }

    #[test]
    fn test_connect_to_listening_server_connects_both_sides() {
        let net = MemoryNetwork::new();
        let mut server = net.create_server(server_addr(4001), 3, 2).unwrap();
        let mut client = net.create_client(2).unwrap();

        let peer = client.connect(loopback(4001), 2).unwrap();
        assert_eq!(client.peer_state(peer), PeerState::Connecting);

        assert_eq!(drain(&mut client), vec![TransportEvent::Connect { peer }]);
        assert_eq!(client.peer_state(peer), PeerState::Connected);

        let events = drain(&mut server);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransportEvent::Connect { .. }));
    }

    #[test]
    fn test_connect_without_listener_reports_disconnect() {
        let net = MemoryNetwork::new();
        let mut client = net.create_client(2).unwrap();

        let peer = client.connect(loopback(4002), 2).unwrap();

        assert_eq!(drain(&mut client), vec![TransportEvent::Disconnect { peer }]);
        assert_eq!(client.peer_state(peer), PeerState::Disconnected);
    }

    #[test]
    fn test_connect_to_full_server_reports_disconnect() {
        let net = MemoryNetwork::new();
        let _server = net.create_server(server_addr(4003), 1, 2).unwrap();
        let mut first = net.create_client(2).unwrap();
        let mut second = net.create_client(2).unwrap();
        first.connect(loopback(4003), 2).unwrap();

        let peer = second.connect(loopback(4003), 2).unwrap();

        assert_eq!(drain(&mut second), vec![TransportEvent::Disconnect { peer }]);
    }

    #[test]
    fn test_send_delivers_bytes_to_remote() {
        let net = MemoryNetwork::new();
        let mut server = net.create_server(server_addr(4004), 3, 2).unwrap();
        let mut client = net.create_client(2).unwrap();
        let peer = client.connect(loopback(4004), 2).unwrap();
        drain(&mut client);
        let remote = drain(&mut server)[0].peer();

        client.send(peer, 0, b"hello", Delivery::Unreliable).unwrap();

        assert_eq!(
            drain(&mut server),
            vec![TransportEvent::Receive {
                peer: remote,
                channel: 0,
                data: b"hello".to_vec()
            }]
        );
    }

    #[test]
    fn test_send_before_connect_event_returns_not_connected() {
        let net = MemoryNetwork::new();
        let _server = net.create_server(server_addr(4005), 3, 2).unwrap();
        let mut client = net.create_client(2).unwrap();
        let peer = client.connect(loopback(4005), 2).unwrap();

        let result = client.send(peer, 0, b"x", Delivery::Reliable);

        assert!(matches!(result, Err(TransportError::PeerNotConnected(_))));
    }

    #[test]
    fn test_send_on_missing_channel_returns_error() {
        let net = MemoryNetwork::new();
        let _server = net.create_server(server_addr(4006), 3, 2).unwrap();
        let mut client = net.create_client(2).unwrap();
        let peer = client.connect(loopback(4006), 2).unwrap();
        drain(&mut client);

        let result = client.send(peer, 5, b"x", Delivery::Reliable);

        assert!(matches!(
            result,
            Err(TransportError::ChannelOutOfRange { channel: 5, channels: 2 })
        ));
    }

    #[test]
    fn test_disconnect_later_delivers_queued_data_first() {
        let net = MemoryNetwork::new();
        let mut server = net.create_server(server_addr(4007), 3, 2).unwrap();
        let mut client = net.create_client(2).unwrap();
        let peer = client.connect(loopback(4007), 2).unwrap();
        drain(&mut client);
        let remote = drain(&mut server)[0].peer();

        server.send(remote, 0, b"bye", Delivery::Reliable).unwrap();
        server.disconnect_later(remote);

        assert_eq!(server.peer_state(remote), PeerState::Disconnecting);
        assert_eq!(
            drain(&mut client),
            vec![
                TransportEvent::Receive { peer, channel: 0, data: b"bye".to_vec() },
                TransportEvent::Disconnect { peer },
            ]
        );
        assert_eq!(
            drain(&mut server),
            vec![TransportEvent::Disconnect { peer: remote }]
        );
        assert_eq!(server.peer_state(remote), PeerState::Disconnected);
    }

    #[test]
    fn test_disconnect_now_notifies_remote_only() {
        let net = MemoryNetwork::new();
        let mut server = net.create_server(server_addr(4008), 3, 2).unwrap();
        let mut client = net.create_client(2).unwrap();
        let peer = client.connect(loopback(4008), 2).unwrap();
        drain(&mut client);
        let remote = drain(&mut server)[0].peer();

        client.disconnect_now(peer);

        assert!(drain(&mut client).is_empty());
        assert_eq!(
            drain(&mut server),
            vec![TransportEvent::Disconnect { peer: remote }]
        );
    }

    #[test]
    fn test_drop_endpoint_disconnects_remote_and_frees_port() {
        let net = MemoryNetwork::new();
        let server = net.create_server(server_addr(4009), 3, 2).unwrap();
        let mut client = net.create_client(2).unwrap();
        let peer = client.connect(loopback(4009), 2).unwrap();
        drain(&mut client);

        drop(server);

        assert_eq!(drain(&mut client), vec![TransportEvent::Disconnect { peer }]);
        let again = net.create_server(server_addr(4009), 3, 2);
        assert!(again.is_ok());
        assert_eq!(net.endpoint_count(), 2);
    }

    #[test]
    fn test_client_endpoints_get_distinct_ephemeral_ports() {
        let net = MemoryNetwork::new();
        let a = net.create_client(2).unwrap();
        let b = net.create_client(2).unwrap();

        assert_ne!(a.local_addr(), b.local_addr());
        assert!(a.local_addr().port() >= EPHEMERAL_START);
    }
}
