//! Byte transport for typewire.
//!
//! Two kinds of endpoint live here:
//!
//! - Streams: a [`Listener`] hands out [`Connection`]s, and a connection
//!   reads exact byte counts, which is all a length-prefixed framing needs.
//!   [`TcpTransport`] and [`TcpConnection`] implement them over TCP.
//! - Datagrams: [`DatagramSocket`] sends and receives whole UDP datagrams
//!   with no connection.
//!
//! Nothing here knows about packets or ids.

#![allow(async_fn_in_trait)]

mod datagram;
mod error;
mod tcp;

pub use datagram::DatagramSocket;
pub use error::TransportError;
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;
use std::net::SocketAddr;

/// Process-unique tag for a stream connection, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A bound, listening stream endpoint.
pub trait Listener: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next inbound stream.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The bound address, with the OS-chosen port when bound to port 0.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// One connected byte stream.
///
/// Reads and writes go through `&self` so a receive loop and a sender can
/// share the connection behind an `Arc`.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes all of `data` and flushes.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads exactly `len` bytes.
    ///
    /// `Ok(None)` means the peer closed the stream before the first byte.
    /// A close after some but not all bytes is a partial transfer and
    /// surfaces as an error.
    async fn recv_exact(&self, len: usize) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Shuts down the sending side.
    async fn close(&self) -> Result<(), Self::Error>;

    /// The process-unique id assigned when the stream was opened.
    fn id(&self) -> ConnectionId;

    /// The remote end's address.
    fn peer_addr(&self) -> SocketAddr;
}
