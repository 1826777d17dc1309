use std::net::SocketAddr;

/// Socket-level failures from streams and datagrams.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding a listener or datagram socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting an inbound stream connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Establishing an outbound stream connection failed.
    #[error("connect to {target} failed: {source}")]
    ConnectFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a frame or datagram failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading from a stream failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Fewer bytes were transferred than the frame required.
    #[error("partial transfer: expected {expected} bytes, got {actual}")]
    PartialTransfer { expected: usize, actual: usize },

    /// The peer closed the stream on a frame boundary.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// There is no connected peer to talk to.
    #[error("not connected")]
    NotConnected,

    /// Querying the local address of a socket failed.
    #[error("local address unavailable: {0}")]
    LocalAddr(#[source] std::io::Error),
}

impl TransportError {
    /// Builds a [`TransportError::ConnectFailed`] for the given target.
    pub fn connect_failed(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::ConnectFailed {
            target: target.into(),
            source,
        }
    }

    /// Builds a [`TransportError::ConnectionClosed`] naming the remote peer.
    pub fn closed_by(peer: SocketAddr) -> Self {
        Self::ConnectionClosed(format!("{peer} closed the stream"))
    }
}
