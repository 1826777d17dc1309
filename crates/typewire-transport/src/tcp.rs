//! TCP stream transport built on `tokio::net`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Listener, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A TCP listener that hands out [`TcpConnection`]s.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a listener to `addr` with the given accept backlog.
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self, TransportError> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        };
        let socket = socket.map_err(TransportError::BindFailed)?;

        #[cfg(unix)]
        socket
            .set_reuseaddr(true)
            .map_err(TransportError::BindFailed)?;

        socket.bind(addr).map_err(TransportError::BindFailed)?;
        let listener = socket.listen(backlog).map_err(TransportError::BindFailed)?;

        tracing::info!(%addr, backlog, "TCP transport listening");
        Ok(Self { listener })
    }
}

impl Listener for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let conn = TcpConnection::from_stream(stream, addr);
        tracing::debug!(id = %conn.id, %addr, "accepted TCP connection");
        Ok(conn)
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener.local_addr().map_err(TransportError::LocalAddr)
    }
}

/// A connected TCP stream, split so that sending never waits on a reader.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpConnection {
    /// Opens a stream to `target` (a `host:port` pair or socket address).
    pub async fn connect<A>(target: A) -> Result<Self, TransportError>
    where
        A: ToSocketAddrs + std::fmt::Debug,
    {
        let label = format!("{target:?}");
        let stream = TcpStream::connect(target)
            .await
            .map_err(|e| TransportError::connect_failed(label.clone(), e))?;
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::connect_failed(label, e))?;

        let conn = Self::from_stream(stream, peer);
        tracing::debug!(id = %conn.id, %peer, "opened TCP connection");
        Ok(conn)
    }

    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        // Frames are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "could not set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();
        Self {
            id: next_connection_id(),
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv_exact(&self, len: usize) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        let mut reader = self.reader.lock().await;

        while filled < len {
            let n = reader
                .read(&mut buf[filled..])
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(TransportError::PartialTransfer {
                    expected: len,
                    actual: filled,
                });
            }
            filled += n;
        }

        Ok(Some(buf))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        match self.writer.lock().await.shutdown().await {
            Ok(()) => Ok(()),
            // The peer already tore the stream down; nothing left to release.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e)),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
