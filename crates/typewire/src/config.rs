//! Socket configuration shared by clients, servers, and nodes.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use tracing::warn;
use typewire_protocol::frame;

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Tunables for the sockets a [`Server`](crate::Server) or
/// [`Node`](crate::Node) binds.
///
/// Every field has a default, so a partial JSON or TOML document
/// deserializes cleanly. Call [`validated`](Self::validated) on values that
/// come from outside the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Address to bind listening and datagram sockets to.
    pub bind_ip: IpAddr,

    /// Pending-connection queue length for the stream server.
    pub listen_backlog: u32,

    /// Receive buffer size for datagram nodes. Datagrams longer than this
    /// are truncated by the OS and then dropped as malformed.
    pub max_datagram_size: usize,
}

impl ConnectionConfig {
    /// Smallest useful datagram: a size prefix plus a packet id.
    pub const MIN_DATAGRAM_SIZE: usize = 4;

    /// Largest datagram the framing can describe: the size prefix plus a
    /// 65535-byte body.
    pub const MAX_DATAGRAM_SIZE: usize = frame::SIZE_PREFIX_LEN + frame::MAX_FRAME_SIZE;

    /// Returns a config bound to `ip` with every other field defaulted.
    pub fn with_bind_ip(ip: impl Into<IpAddr>) -> Self {
        Self {
            bind_ip: ip.into(),
            ..Self::default()
        }
    }

    /// Clamps out-of-range values.
    ///
    /// - `listen_backlog` raised to at least 1.
    /// - `max_datagram_size` clamped to
    ///   `MIN_DATAGRAM_SIZE..=MAX_DATAGRAM_SIZE`.
    pub fn validated(mut self) -> Self {
        if self.listen_backlog == 0 {
            warn!("listen_backlog is 0, using 1");
            self.listen_backlog = 1;
        }
        let clamped = self
            .max_datagram_size
            .clamp(Self::MIN_DATAGRAM_SIZE, Self::MAX_DATAGRAM_SIZE);
        if clamped != self.max_datagram_size {
            warn!(
                requested = self.max_datagram_size,
                used = clamped,
                "max_datagram_size out of range, clamping"
            );
            self.max_datagram_size = clamped;
        }
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_backlog: 16,
            max_datagram_size: Self::MAX_DATAGRAM_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.bind_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.listen_backlog, 16);
        assert_eq!(config.max_datagram_size, 65_537);
    }

    #[test]
    fn test_max_datagram_fits_largest_frame() {
        assert_eq!(ConnectionConfig::MAX_DATAGRAM_SIZE, 2 + u16::MAX as usize);
        let config = ConnectionConfig {
            max_datagram_size: 65_537,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.max_datagram_size, 65_537);
    }

    #[test]
    fn test_validated_clamps_zero_backlog() {
        let config = ConnectionConfig {
            listen_backlog: 0,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.listen_backlog, 1);
    }

    #[test]
    fn test_validated_clamps_datagram_size() {
        let small = ConnectionConfig {
            max_datagram_size: 1,
            ..Default::default()
        }
        .validated();
        assert_eq!(small.max_datagram_size, ConnectionConfig::MIN_DATAGRAM_SIZE);

        let large = ConnectionConfig {
            max_datagram_size: 1 << 20,
            ..Default::default()
        }
        .validated();
        assert_eq!(large.max_datagram_size, ConnectionConfig::MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_validated_keeps_valid_values() {
        let config = ConnectionConfig::with_bind_ip(Ipv4Addr::LOCALHOST);
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = ConnectionConfig {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_backlog: 4,
            max_datagram_size: 1500,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ConnectionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: ConnectionConfig = serde_json::from_str(r#"{"listen_backlog": 2}"#).unwrap();
        assert_eq!(config.listen_backlog, 2);
        assert_eq!(config.max_datagram_size, 65_537);
    }
}
