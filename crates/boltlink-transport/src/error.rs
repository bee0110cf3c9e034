use std::net::SocketAddr;

use crate::PeerId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the local socket failed.
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The address is already bound by another endpoint.
    #[error("address {0} already in use")]
    AddressInUse(SocketAddr),

    /// A socket operation failed after setup.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint has no record of this peer.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The peer exists but is not in the connected state.
    #[error("peer {0} is not connected")]
    PeerNotConnected(PeerId),

    /// The channel index is outside what the connection negotiated.
    #[error("channel {channel} out of range (endpoint has {channels})")]
    ChannelOutOfRange { channel: u8, channels: usize },

    /// The endpoint cannot hold another peer.
    #[error("endpoint is at capacity ({0} peers)")]
    CapacityReached(usize),

    /// The channel's send buffer is full; the message was not queued.
    #[error("channel {channel} to {peer} is full")]
    ChannelFull { peer: PeerId, channel: u8 },

    /// The netcode layer refused to set up a connection.
    #[error("netcode: {0}")]
    Netcode(String),
}
