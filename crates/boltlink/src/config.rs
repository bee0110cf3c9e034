//! Network configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The session's fixed port.
pub const DEFAULT_PORT: u16 = 27015;

/// Simulation ticks per second; `update` is expected once per tick.
pub const TICK_RATE_HZ: u32 = 30;

// ---------------------------------------------------------------------------
// NetConfig
// ---------------------------------------------------------------------------

/// Settings for a [`Network`](crate::Network).
///
/// The defaults describe a three-player session: the host plus two
/// clients. The host's endpoint accepts one more connection than it has
/// slots for, so a fourth player gets a polite `server_full` instead of a
/// silent timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Port the host listens on and clients connect to.
    pub port: u16,

    /// Connections the host endpoint accepts, including ones it will turn
    /// away.
    pub max_peers: usize,

    /// Channels per connection.
    pub channels: usize,

    /// Channel all messages are sent on.
    pub channel: u8,

    /// Tick rate in Hz.
    pub tick_rate_hz: u32,

    /// How often the host broadcasts simulation snapshots.
    pub snapshot_interval: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_peers: 3,
            channels: 2,
            channel: 0,
            tick_rate_hz: TICK_RATE_HZ,
            snapshot_interval: Duration::from_millis(100),
        }
    }
}

impl NetConfig {
    /// Highest tick rate accepted by [`validated`](Self::validated).
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Default settings on a different port.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Address the host binds: every interface, on [`port`](Self::port).
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Length of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }

    /// Pulls out-of-range values back into range. Rules:
    /// - `max_peers` and `channels` are at least 1; `channels` at most 255.
    /// - `channel` must name one of the `channels`, else 0.
    /// - `tick_rate_hz` is clamped to `1..=MAX_TICK_RATE_HZ`.
    pub fn validated(mut self) -> Self {
        self.max_peers = self.max_peers.max(1);
        self.channels = self.channels.clamp(1, usize::from(u8::MAX));
        if usize::from(self.channel) >= self.channels {
            tracing::warn!(
                channel = self.channel,
                channels = self.channels,
                "channel out of range, using 0"
            );
            self.channel = 0;
        }
        if !(1..=Self::MAX_TICK_RATE_HZ).contains(&self.tick_rate_hz) {
            tracing::warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz out of range, clamping"
            );
            self.tick_rate_hz = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_config_default() {
        let config = NetConfig::default();
        assert_eq!(config.port, 27015);
        assert_eq!(config.max_peers, 3);
        assert_eq!(config.channels, 2);
        assert_eq!(config.channel, 0);
        assert_eq!(config.tick_rate_hz, 30);
    }

    #[test]
    fn test_bind_addr_listens_on_all_interfaces() {
        let addr = NetConfig::with_port(4000).bind_addr();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 4000);
    }

    #[test]
    fn test_tick_duration_at_thirty_hz() {
        let tick = NetConfig::default().tick_duration();
        assert_eq!(tick.as_micros(), 33_333);
    }

    #[test]
    fn test_validated_fixes_out_of_range_values() {
        let config = NetConfig {
            max_peers: 0,
            channels: 0,
            channel: 5,
            tick_rate_hz: 1000,
            ..NetConfig::default()
        }
        .validated();

        assert_eq!(config.max_peers, 1);
        assert_eq!(config.channels, 1);
        assert_eq!(config.channel, 0);
        assert_eq!(config.tick_rate_hz, NetConfig::MAX_TICK_RATE_HZ);
    }

    #[test]
    fn test_validated_keeps_valid_config() {
        assert_eq!(NetConfig::default().validated(), NetConfig::default());
    }

    #[test]
    fn test_net_config_partial_json_uses_defaults() {
        let config: NetConfig = serde_json::from_str(r#"{"port": 28000}"#).unwrap();
        assert_eq!(config.port, 28000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.snapshot_interval, Duration::from_millis(100));
    }
}
