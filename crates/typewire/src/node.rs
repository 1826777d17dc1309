//! Datagram node: sends typed packets to any address and receives from
//! anyone.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};
use typewire_protocol::{Packet, PacketRegistry, PacketShape, frame};
use typewire_transport::DatagramSocket;

use crate::receiver::{self, HandlerSlot, PacketHandler, ReceiveLoop};
use crate::{ConnectionConfig, NodeState, TypewireError};

/// A UDP endpoint speaking framed, registry-typed packets.
///
/// Each packet is one datagram, laid out exactly like a stream frame.
/// There is no connection: [`send`](Self::send) takes the destination,
/// and the callback does not learn the sender.
pub struct Node<M> {
    registry: Arc<PacketRegistry<M>>,
    handler: Arc<HandlerSlot<M>>,
    config: ConnectionConfig,
    state: NodeState,
    socket: Option<Arc<DatagramSocket>>,
    receiver: Option<ReceiveLoop>,
}

impl<M: Send + 'static> Node<M> {
    /// Creates a stopped node with the default [`ConnectionConfig`].
    pub fn new(registry: Arc<PacketRegistry<M>>) -> Self {
        Self::with_config(registry, ConnectionConfig::default())
    }

    /// Creates a stopped node with `config` (validated first).
    pub fn with_config(registry: Arc<PacketRegistry<M>>, config: ConnectionConfig) -> Self {
        Self {
            registry,
            handler: Arc::new(HandlerSlot::new()),
            config: config.validated(),
            state: NodeState::Stopped,
            socket: None,
            receiver: None,
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

    /// Replaces the packet callback. Takes effect from the next datagram.
    pub fn set_on_packet_received<F>(&self, handler: F)
    where
        F: Fn(M, &'static PacketShape) + Send + Sync + 'static,
    {
        let handler: PacketHandler<M> = Arc::new(handler);
        self.handler.set(handler);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// The configuration in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns `true` while the receive loop is alive.
    pub fn is_receiving(&self) -> bool {
        self.receiver.as_ref().is_some_and(ReceiveLoop::is_running)
    }

    /// The bound address. Useful after starting on port 0.
    ///
    /// # Errors
    /// [`TypewireError::InvalidState`] unless the node is `Running`.
    pub fn local_addr(&self) -> Result<SocketAddr, TypewireError> {
        self.state.require(NodeState::Running, "query local address")?;
        match &self.socket {
            Some(socket) => Ok(socket.local_addr()?),
            None => Err(TypewireError::InvalidState {
                operation: "query local address",
                state: self.state.as_str(),
            }),
        }
    }

    /// Binds to `port` (0 for any free port) and starts receiving.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the node is `Stopped`.
    /// - [`TransportError::BindFailed`](typewire_transport::TransportError::BindFailed)
    ///   if the port is unavailable. The node is `Stopped` again afterwards.
    pub async fn start(&mut self, port: u16) -> Result<(), TypewireError> {
        self.state.require(NodeState::Stopped, "start")?;
        self.state = NodeState::Starting;

        let addr = SocketAddr::new(self.config.bind_ip, port);
        let socket = match DatagramSocket::bind(addr).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                warn!(%addr, error = %e, "node start failed");
                self.state = NodeState::Stopped;
                return Err(e.into());
            }
        };

        self.receiver = Some(ReceiveLoop::spawn({
            let socket = Arc::clone(&socket);
            let registry = Arc::clone(&self.registry);
            let handler = Arc::clone(&self.handler);
            let max_datagram_size = self.config.max_datagram_size;
            move |cancel| receiver::run_datagram(socket, registry, handler, max_datagram_size, cancel)
        }));

        match socket.local_addr() {
            Ok(local_addr) => info!(%local_addr, "node started"),
            Err(_) => info!(%addr, "node started"),
        }
        self.socket = Some(socket);
        self.state = NodeState::Running;
        Ok(())
    }

    /// Stops receiving and releases the port.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the node is `Running`.
    /// - [`TypewireError::ReceiveTaskFailed`] if the receive task panicked.
    ///   The node stays `Running`; a second `stop` completes the teardown.
    pub async fn stop(&mut self) -> Result<(), TypewireError> {
        self.state.require(NodeState::Running, "stop")?;
        self.state = NodeState::Stopping;
        info!("node stopping");

        if let Some(receiver) = self.receiver.as_mut() {
            match receiver.stop().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "datagram loop ended with error"),
                Err(e) => {
                    warn!(error = %e, "receive task failed");
                    self.state = NodeState::Running;
                    return Err(e);
                }
            }
        }

        self.receiver = None;
        self.socket = None;
        self.state = NodeState::Stopped;
        info!("node stopped");
        Ok(())
    }

    /// Frames `packet` and sends it as one datagram to `dest`.
    ///
    /// Returns `Ok(true)` if the whole datagram went out and `Ok(false)` if
    /// the OS accepted only part of it.
    ///
    /// # Errors
    /// - [`TypewireError::InvalidState`] unless the node is `Running`.
    /// - [`ProtocolError::NotRegistered`](typewire_protocol::ProtocolError::NotRegistered)
    ///   or [`ProtocolError::PacketTooLarge`](typewire_protocol::ProtocolError::PacketTooLarge);
    ///   nothing is sent in either case.
    /// - [`TransportError::SendFailed`](typewire_transport::TransportError::SendFailed)
    ///   if the OS rejects the datagram.
    pub async fn send<P: Packet>(&self, packet: &P, dest: SocketAddr) -> Result<bool, TypewireError> {
        self.state.require(NodeState::Running, "send")?;
        let socket = self.socket.as_ref().ok_or(TypewireError::InvalidState {
            operation: "send",
            state: self.state.as_str(),
        })?;
        let frame = frame::prepare(&self.registry, packet)?;
        let sent = socket.send_to(&frame, dest).await?;
        if sent != frame.len() {
            warn!(%dest, sent, expected = frame.len(), "partial datagram send");
        }
        Ok(sent == frame.len())
    }
}
