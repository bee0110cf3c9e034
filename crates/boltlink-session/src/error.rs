//! Error types for the session layer.

use boltlink_transport::PeerId;

/// Errors from player slot bookkeeping.
///
/// Neither is fatal: the host answers a full session with `server_full`
/// and a duplicate registration means the transport reported a connect
/// twice for the same peer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every client slot is taken.
    #[error("session is full")]
    SessionFull,

    /// The peer already holds a slot.
    #[error("peer {0} is already registered")]
    AlreadyRegistered(PeerId),
}
