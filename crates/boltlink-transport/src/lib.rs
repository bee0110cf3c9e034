//! Transport abstraction layer for boltlink.
//!
//! Provides the [`Backend`] and [`Endpoint`] traits that abstract over an
//! ENet-style unreliable transport: a local endpoint that owns a set of
//! peers, is polled without blocking, and sends datagrams to a peer either
//! reliably or best-effort.
//!
//! # Feature Flags
//!
//! - `memory` (default): in-process backend for tests and single-process demos
//! - `renet` (default): UDP backend on `renet` with the netcode transport

mod error;
mod lan;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "renet")]
mod netcode;

pub use error::TransportError;
pub use lan::lan_address;
#[cfg(feature = "memory")]
pub use memory::{MemoryEndpoint, MemoryNetwork};
#[cfg(feature = "renet")]
pub use netcode::{PROTOCOL_ID, RenetBackend, RenetConfig, RenetEndpoint};

use std::fmt;
use std::net::SocketAddr;

/// Opaque handle to a remote peer, as seen by the local endpoint.
///
/// Handles are minted by the endpoint that owns the peer and are never
/// reused by that endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    /// Creates a new `PeerId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Delivery mode for an outgoing packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Delivered eventually and in order within its channel.
    #[default]
    Reliable,
    /// May be dropped. Used for high-frequency, loss-tolerant updates.
    Unreliable,
}

impl Delivery {
    /// Maps the `reliable` flag used throughout the messaging API.
    pub fn from_reliable(reliable: bool) -> Self {
        if reliable {
            Self::Reliable
        } else {
            Self::Unreliable
        }
    }
}

/// Connection state of a peer as reported by its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Handshake in flight.
    Connecting,
    /// Connected; data can flow both ways.
    Connected,
    /// A graceful disconnect was requested; queued data is still draining.
    Disconnecting,
    /// Gone, or never known to this endpoint.
    Disconnected,
}

/// A transport-level event returned by [`Endpoint::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer finished connecting (either direction).
    Connect { peer: PeerId },
    /// A packet arrived from a peer.
    Receive { peer: PeerId, channel: u8, data: Vec<u8> },
    /// A peer disconnected, timed out, or a connection attempt failed.
    Disconnect { peer: PeerId },
}

impl TransportEvent {
    /// The peer this event concerns.
    pub fn peer(&self) -> PeerId {
        match self {
            Self::Connect { peer }
            | Self::Receive { peer, .. }
            | Self::Disconnect { peer } => *peer,
        }
    }
}

/// Creates endpoints. One backend value can create any number of them.
pub trait Backend {
    /// The endpoint type produced by this backend.
    type Endpoint: Endpoint;

    /// Creates an endpoint bound to `bind` that accepts up to `max_peers`
    /// incoming connections, each with `channels` channels.
    fn create_server(
        &self,
        bind: SocketAddr,
        max_peers: usize,
        channels: usize,
    ) -> Result<Self::Endpoint, TransportError>;

    /// Creates an endpoint on an ephemeral port with room for one outgoing
    /// connection.
    fn create_client(
        &self,
        channels: usize,
    ) -> Result<Self::Endpoint, TransportError>;
}

/// A local transport endpoint and the peers it owns.
///
/// Every method is non-blocking. Dropping the endpoint destroys it; peers
/// still attached are dropped without a graceful handshake.
pub trait Endpoint {
    /// Starts connecting to `remote`. The outcome arrives later through
    /// [`poll`](Self::poll) as a `Connect` or `Disconnect` event for the
    /// returned peer.
    fn connect(
        &mut self,
        remote: SocketAddr,
        channels: usize,
    ) -> Result<PeerId, TransportError>;

    /// Returns the next pending event, or `None` when there is nothing to
    /// report right now. Never blocks.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Queues `data` for `peer` on `channel`.
    fn send(
        &mut self,
        peer: PeerId,
        channel: u8,
        data: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError>;

    /// Drops `peer` immediately. The remote side is notified best-effort;
    /// no local `Disconnect` event is generated.
    fn disconnect_now(&mut self, peer: PeerId);

    /// Disconnects `peer` once its queued reliable data has been delivered.
    /// A local `Disconnect` event follows.
    fn disconnect_later(&mut self, peer: PeerId);

    /// Current state of `peer`.
    fn peer_state(&self, peer: PeerId) -> PeerState;

    /// Pushes out anything queued without waiting for the next poll.
    fn flush(&mut self);

    /// The address this endpoint is reachable at.
    fn local_addr(&self) -> SocketAddr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_new_and_into_inner() {
        let id = PeerId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_peer_id_display() {
        assert_eq!(PeerId::new(7).to_string(), "peer-7");
    }

    #[test]
    fn test_delivery_from_reliable_flag() {
        assert_eq!(Delivery::from_reliable(true), Delivery::Reliable);
        assert_eq!(Delivery::from_reliable(false), Delivery::Unreliable);
        assert_eq!(Delivery::default(), Delivery::Reliable);
    }

    #[test]
    fn test_transport_event_peer_accessor() {
        let p = PeerId::new(3);
        assert_eq!(TransportEvent::Connect { peer: p }.peer(), p);
        assert_eq!(
            TransportEvent::Receive { peer: p, channel: 0, data: vec![1] }.peer(),
            p
        );
        assert_eq!(TransportEvent::Disconnect { peer: p }.peer(), p);
    }
}
