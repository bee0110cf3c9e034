//! Unified error type for boltlink.

use boltlink_protocol::ProtocolError;
use boltlink_transport::TransportError;

/// Top-level error for session setup, wrapping the crate-specific errors.
///
/// Only starting a session can fail in a way the caller must handle.
/// Everything after that (bad packets, full sessions, dropped peers) is
/// reported through events or logged.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The host endpoint could not be created, usually because the port
    /// is taken.
    #[error("failed to create server on port {port}: {source}")]
    HostSetup {
        port: u16,
        #[source]
        source: TransportError,
    },

    /// The client endpoint could not be created or could not start
    /// connecting.
    #[error("failed to create client: {source}")]
    ClientSetup {
        #[source]
        source: TransportError,
    },

    /// The host address did not resolve to anything.
    #[error("cannot resolve host address {address:?}")]
    InvalidAddress { address: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_setup_message_names_port() {
        let err = NetError::HostSetup {
            port: 27015,
            source: TransportError::AddressInUse(([0, 0, 0, 0], 27015).into()),
        };
        let text = err.to_string();
        assert!(text.contains("27015"));
        assert!(text.starts_with("failed to create server"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: NetError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, NetError::Protocol(_)));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_client_setup_keeps_transport_source() {
        use std::error::Error;

        let err = NetError::ClientSetup {
            source: TransportError::Netcode("no route".into()),
        };

        let source = err.source().expect("transport error is the source");
        assert!(source.to_string().contains("no route"));
    }
}
