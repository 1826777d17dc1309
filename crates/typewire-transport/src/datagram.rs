//! Connectionless UDP endpoint. Every send names its destination.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::TransportError;

/// A bound UDP socket.
pub struct DatagramSocket {
    socket: UdpSocket,
}

impl DatagramSocket {
    /// Binds a UDP socket to `addr`. Port 0 picks any free port.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(%addr, "UDP socket bound");
        Ok(Self { socket })
    }

    /// Returns the local address, including the port picked by the OS.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::LocalAddr)
    }

    /// Sends one datagram to `target`, returning how many bytes the
    /// socket accepted.
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize, TransportError> {
        self.socket
            .send_to(data, target)
            .await
            .map_err(TransportError::SendFailed)
    }

    /// Receives one datagram into `buf`.
    ///
    /// Errors are returned as raw `io::Error` so the caller can decide
    /// which kinds end its loop.
    pub async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}
