//! # boltlink
//!
//! Host-authoritative session networking for small LAN games.
//!
//! One player hosts; up to two more join. The host hands each client a
//! player id (2 or 3), tells a fourth player the session is full, relays
//! messages between clients, and broadcasts simulation snapshots. Everything
//! runs inside the game's own tick: [`Network::update`] polls without
//! blocking and [`Network::messages`] hands over what arrived.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use boltlink::prelude::*;
//!
//! let mut net = Network::new(RenetBackend::default(), NetConfig::default());
//! net.start_host()?;
//!
//! loop {
//!     net.update(Duration::from_millis(33));
//!     for event in net.messages() {
//!         if let NetEvent::Message { message, from: Some(from) } = event {
//!             net.relay(from, &message, true)?;
//!         }
//!     }
//!     # break;
//! }
//! # Ok::<(), NetError>(())
//! ```

mod config;
mod error;
mod network;
pub mod sync;

pub use config::{DEFAULT_PORT, NetConfig, TICK_RATE_HZ};
pub use error::NetError;
pub use network::Network;

pub use boltlink_protocol as protocol;
pub use boltlink_session as session;
pub use boltlink_transport as transport;

/// Everything a game loop usually needs.
pub mod prelude {
    pub use crate::sync::{
        EffectInstance, HazardSnapshot, Replicated, Snapshot, SnapshotTimer,
    };
    pub use crate::{DEFAULT_PORT, NetConfig, NetError, Network, TICK_RATE_HZ};

    #[cfg(feature = "json")]
    pub use boltlink_protocol::JsonCodec;
    pub use boltlink_protocol::{
        Codec, Control, Field, Fields, Group, Message, PlayerId, ProtocolError,
        TextCodec, Value,
    };
    pub use boltlink_session::{NetEvent, Role};
    pub use boltlink_transport::{
        Backend, Delivery, Endpoint, MemoryNetwork, PeerId, RenetBackend,
        RenetConfig, TransportError, lan_address,
    };
}
