//! Stream client: connects to one server and exchanges typed packets.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use typewire_protocol::{Packet, PacketRegistry, PacketShape, frame};
use typewire_transport::{Connection, TcpConnection, TransportError};

use crate::receiver::{self, HandlerSlot, PacketHandler, ReceiveLoop};
use crate::{ConnectionState, TypewireError};

/// A TCP client speaking framed, registry-typed packets.
///
/// Inbound packets are decoded into `M` (see
/// [`PacketRegistry`]) and handed to the callback set with
/// [`on_packet_received`](Self::on_packet_received).
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use typewire::prelude::*;
/// # packet! { pub struct Ping { pub seq: u32 } }
/// # async fn demo() -> Result<(), TypewireError> {
/// let mut registry = PacketRegistry::<Ping>::new();
/// registry.register::<Ping>()?;
///
/// let mut client = Client::new(Arc::new(registry))
///     .on_packet_received(|ping: Ping, _| println!("ping {}", ping.seq));
/// client.connect("127.0.0.1", 7000).await?;
/// client.send(&Ping { seq: 1 }).await?;
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client<M> {
    registry: Arc<PacketRegistry<M>>,
    handler: Arc<HandlerSlot<M>>,
    state: ConnectionState,
    connection: Option<Arc<TcpConnection>>,
    receiver: Option<ReceiveLoop>,
    last_receive_error: Option<TypewireError>,
}

impl<M: Send + 'static> Client<M> {
    /// Creates an idle client that encodes and decodes through `registry`.
    pub fn new(registry: Arc<PacketRegistry<M>>) -> Self {
        Self {
            registry,
            handler: Arc::new(HandlerSlot::new()),
            state: ConnectionState::Idle,
            connection: None,
            receiver: None,
            last_receive_error: None,
        }
    }

    /// Sets the packet callback, builder style.
    pub fn on_packet_received<F>(self, handler: F) -> Self
    where
        F: Fn(M, &'static PacketShape) + Send + Sync + 'static,
    {
        self.set_on_packet_received(handler);
        self
    }

    /// Replaces the packet callback. Takes effect from the next packet,
    /// even while connected.
    pub fn set_on_packet_received<F>(&self, handler: F)
    where
        F: Fn(M, &'static PacketShape) + Send + Sync + 'static,
    {
        let handler: PacketHandler<M> = Arc::new(handler);
        self.handler.set(handler);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The server's address while connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(|conn| conn.peer_addr())
    }

    /// Returns `true` while the receive loop is alive.
    ///
    /// Turns `false` once the server closes the stream or a read fails;
    /// the state stays `Active` until [`disconnect`](Self::disconnect).
    pub fn is_receiving(&self) -> bool {
        self.receiver.as_ref().is_some_and(ReceiveLoop::is_running)
    }

    /// The error that ended the previous connection's receive loop, if
    /// any. Collected by [`disconnect`](Self::disconnect).
    pub fn last_receive_error(&self) -> Option<&TypewireError> {
        self.last_receive_error.as_ref()
    }

    /// Connects to `host:port` and starts receiving.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the client is `Idle`.
    /// - [`TransportError::ConnectFailed`] if the connection cannot be
    ///   opened. The client is `Idle` again afterwards.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), TypewireError> {
        self.state.require(ConnectionState::Idle, "connect")?;
        self.state = ConnectionState::Starting;
        info!(host, port, "connecting");

        let conn = match TcpConnection::connect((host, port)).await {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                warn!(host, port, error = %e, "connect failed");
                self.state = ConnectionState::Idle;
                return Err(e.into());
            }
        };

        self.last_receive_error = None;
        self.receiver = Some(ReceiveLoop::spawn({
            let conn = Arc::clone(&conn);
            let registry = Arc::clone(&self.registry);
            let handler = Arc::clone(&self.handler);
            move |cancel| receiver::run_stream(conn, registry, handler, cancel)
        }));

        info!(id = %conn.id(), peer = %conn.peer_addr(), "connected");
        self.connection = Some(conn);
        self.state = ConnectionState::Active;
        Ok(())
    }

    /// Stops receiving and closes the connection.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the client is `Active`.
    /// - [`TypewireError::ReceiveTaskFailed`] if the receive task panicked
    ///   (usually inside the callback). The client stays `Active`, so a
    ///   second `disconnect` completes the teardown.
    pub async fn disconnect(&mut self) -> Result<(), TypewireError> {
        self.state.require(ConnectionState::Active, "disconnect")?;
        self.state = ConnectionState::Stopping;
        info!("disconnecting");

        if let Some(receiver) = self.receiver.as_mut() {
            match receiver.stop().await {
                Ok(outcome) => self.last_receive_error = outcome.err(),
                Err(e) => {
                    warn!(error = %e, "receive task failed");
                    self.state = ConnectionState::Active;
                    return Err(e);
                }
            }
        }
        self.receiver = None;

        if let Some(conn) = &self.connection {
            if let Err(e) = conn.close().await {
                self.state = ConnectionState::Active;
                return Err(e.into());
            }
        }
        self.connection = None;
        self.state = ConnectionState::Idle;
        info!("disconnected");
        Ok(())
    }

    /// Frames `packet` and writes it to the server.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the client is `Active`.
    /// - [`ProtocolError::NotRegistered`](typewire_protocol::ProtocolError::NotRegistered)
    ///   or [`ProtocolError::PacketTooLarge`](typewire_protocol::ProtocolError::PacketTooLarge);
    ///   nothing is written in either case.
    /// - [`TransportError::SendFailed`] if the write fails.
    pub async fn send<P: Packet>(&self, packet: &P) -> Result<(), TypewireError> {
        self.state.require(ConnectionState::Active, "send")?;
        let conn = self.connection.as_ref().ok_or(TransportError::NotConnected)?;
        let frame = frame::prepare(&self.registry, packet)?;
        conn.send(&frame).await?;
        Ok(())
    }
}
