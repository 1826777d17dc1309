//! Stream server: listens on a port and talks to the first peer that
//! connects.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use typewire_protocol::{Packet, PacketRegistry, PacketShape, frame};
use typewire_transport::{Connection, Listener, TcpConnection, TcpTransport, TransportError};

use crate::receiver::{self, HandlerSlot, PacketHandler, ReceiveLoop};
use crate::{ConnectionConfig, ConnectionState, TypewireError};

/// Slot holding the accepted peer, filled by the receive task.
type PeerSlot = Arc<Mutex<Option<Arc<TcpConnection>>>>;

/// A TCP server speaking framed, registry-typed packets with one peer.
///
/// [`start`](Self::start) binds, listens, and returns immediately. The
/// receive task then accepts exactly one connection and reads from it.
/// Later connection attempts are never accepted: they wait in the listen
/// backlog until the server stops.
pub struct Server<M> {
    registry: Arc<PacketRegistry<M>>,
    handler: Arc<HandlerSlot<M>>,
    config: ConnectionConfig,
    state: ConnectionState,
    local_addr: Option<SocketAddr>,
    peer: PeerSlot,
    receiver: Option<ReceiveLoop>,
    last_receive_error: Option<TypewireError>,
}

impl<M: Send + 'static> Server<M> {
    /// Creates an idle server with the default [`ConnectionConfig`].
    pub fn new(registry: Arc<PacketRegistry<M>>) -> Self {
        Self::with_config(registry, ConnectionConfig::default())
    }

    /// Creates an idle server with `config` (validated first).
    pub fn with_config(registry: Arc<PacketRegistry<M>>, config: ConnectionConfig) -> Self {
        Self {
            registry,
            handler: Arc::new(HandlerSlot::new()),
            config: config.validated(),
            state: ConnectionState::Idle,
            local_addr: None,
            peer: Arc::new(Mutex::new(None)),
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

    /// Replaces the packet callback. Takes effect from the next packet.
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

    /// The configuration in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The bound listening address while `Active`. Useful after starting
    /// on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The accepted peer's address, once one has connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.current_peer().map(|conn| conn.peer_addr())
    }

    /// Returns `true` while the accept/receive task is alive.
    pub fn is_receiving(&self) -> bool {
        self.receiver.as_ref().is_some_and(ReceiveLoop::is_running)
    }

    /// The error that ended the previous session's receive loop, if any.
    pub fn last_receive_error(&self) -> Option<&TypewireError> {
        self.last_receive_error.as_ref()
    }

    /// Binds to `port` on the configured address, listens, and spawns the
    /// task that accepts the peer.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the server is `Idle`.
    /// - [`TransportError::BindFailed`] if the port is unavailable. The
    ///   server is `Idle` again afterwards.
    pub async fn start(&mut self, port: u16) -> Result<(), TypewireError> {
        self.state.require(ConnectionState::Idle, "start")?;
        self.state = ConnectionState::Starting;

        let addr = SocketAddr::new(self.config.bind_ip, port);
        let bound = TcpTransport::bind(addr, self.config.listen_backlog)
            .and_then(|transport| Ok((transport.local_addr()?, transport)));
        let (local_addr, transport) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                warn!(%addr, error = %e, "server start failed");
                self.state = ConnectionState::Idle;
                return Err(e.into());
            }
        };

        self.last_receive_error = None;
        self.receiver = Some(ReceiveLoop::spawn({
            let peer = Arc::clone(&self.peer);
            let registry = Arc::clone(&self.registry);
            let handler = Arc::clone(&self.handler);
            move |cancel| accept_and_receive(transport, peer, registry, handler, cancel)
        }));

        self.local_addr = Some(local_addr);
        self.state = ConnectionState::Active;
        info!(%local_addr, "server started");
        Ok(())
    }

    /// Stops the receive task, closes the peer connection, and releases
    /// the port.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the server is `Active`.
    /// - [`TypewireError::ReceiveTaskFailed`] if the receive task panicked.
    ///   The server stays `Active`; a second `stop` completes the teardown.
    pub async fn stop(&mut self) -> Result<(), TypewireError> {
        self.state.require(ConnectionState::Active, "stop")?;
        self.state = ConnectionState::Stopping;
        info!("server stopping");

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

        if let Some(conn) = self.current_peer() {
            if let Err(e) = conn.close().await {
                self.state = ConnectionState::Active;
                return Err(e.into());
            }
        }
        self.peer.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.local_addr = None;
        self.state = ConnectionState::Idle;
        info!("server stopped");
        Ok(())
    }

    /// Frames `packet` and writes it to the connected peer.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the server is `Active`.
    /// - [`TransportError::NotConnected`] if no peer has connected yet.
    /// - Framing and write errors as for [`Client::send`](crate::Client::send).
    pub async fn send<P: Packet>(&self, packet: &P) -> Result<(), TypewireError> {
        self.state.require(ConnectionState::Active, "send")?;
        let conn = self.current_peer().ok_or(TransportError::NotConnected)?;
        let frame = frame::prepare(&self.registry, packet)?;
        conn.send(&frame).await?;
        Ok(())
    }

    fn current_peer(&self) -> Option<Arc<TcpConnection>> {
        self.peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Accepts one peer, publishes it, then runs the stream loop on it.
///
/// The listener stays open until this returns, so further connection
/// attempts queue in the backlog instead of being refused.
async fn accept_and_receive<M: Send + 'static>(
    mut transport: TcpTransport,
    peer: PeerSlot,
    registry: Arc<PacketRegistry<M>>,
    handler: Arc<HandlerSlot<M>>,
    cancel: CancellationToken,
) -> Result<(), TypewireError> {
    let conn = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        accepted = transport.accept() => Arc::new(accepted?),
    };
    info!(id = %conn.id(), peer = %conn.peer_addr(), "peer connected");
    *peer.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&conn));

    let outcome = receiver::run_stream(conn, registry, handler, cancel).await;
    drop(transport);
    outcome
}
