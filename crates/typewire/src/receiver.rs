//! Background receive loops and the callback slot they dispatch into.
//!
//! Each running client, server, or node owns one [`ReceiveLoop`]: a spawned
//! task plus the [`CancellationToken`] that stops it. The loop reads frames,
//! decodes them through the shared registry, and hands every packet to the
//! [`HandlerSlot`]. The slot is read on each dispatch, so replacing the
//! callback takes effect at the next packet.
//!
//! The two loops treat errors differently:
//!
//! | Event                        | Stream loop      | Datagram loop |
//! |------------------------------|------------------|---------------|
//! | Unknown id, bad payload      | skip frame       | skip datagram |
//! | Peer closed, partial frame   | end, keep error  | n/a           |
//! | Other read error             | end, keep error  | log, continue |
//! | Interrupted                  | end, keep error  | end           |

use std::io::ErrorKind;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use typewire_protocol::{PacketRegistry, PacketShape, Received, frame};
use typewire_transport::{Connection, DatagramSocket, TcpConnection, TransportError};

use crate::TypewireError;

/// Callback invoked with each decoded packet and the shape it arrived as.
///
/// Runs on the receive task. A slow callback delays the next read; a
/// panicking one ends the loop, and the panic surfaces from the next
/// `disconnect`/`stop` as [`TypewireError::ReceiveTaskFailed`].
pub type PacketHandler<M> = Arc<dyn Fn(M, &'static PacketShape) + Send + Sync>;

// ---------------------------------------------------------------------------
// HandlerSlot
// ---------------------------------------------------------------------------

/// Replaceable, optional packet callback shared with the receive task.
pub(crate) struct HandlerSlot<M> {
    handler: RwLock<Option<PacketHandler<M>>>,
}

impl<M> HandlerSlot<M> {
    pub(crate) fn new() -> Self {
        Self {
            handler: RwLock::new(None),
        }
    }

    pub(crate) fn set(&self, handler: PacketHandler<M>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Invokes the current callback, if any. The lock is released before
    /// the callback runs.
    pub(crate) fn dispatch(&self, received: Received<M>) {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => handler(received.packet, received.shape),
            None => trace!(id = %received.id, shape = received.shape.name(), "no handler, packet dropped"),
        }
    }
}

// ---------------------------------------------------------------------------
// ReceiveLoop
// ---------------------------------------------------------------------------

/// A spawned receive task and its stop signal.
///
/// Dropping a `ReceiveLoop` cancels the task without waiting for it.
pub(crate) struct ReceiveLoop {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), TypewireError>>>,
}

impl ReceiveLoop {
    /// Spawns `run` with a fresh cancellation token.
    pub(crate) fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TypewireError>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Returns `true` while the task has not finished.
    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the task and waits for it to finish.
    ///
    /// The outer `Result` fails only if the task panicked or was aborted;
    /// the inner one is the loop's own outcome. Once the task has been
    /// joined, further calls return `Ok(Ok(()))`.
    pub(crate) async fn stop(&mut self) -> Result<Result<(), TypewireError>, TypewireError> {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return Ok(Ok(()));
        };
        task.await
            .map_err(|e| TypewireError::ReceiveTaskFailed(e.to_string()))
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Stream loop
// ---------------------------------------------------------------------------

/// Reads frames from `conn` until cancelled or the stream fails.
///
/// Frames that decode badly are skipped; the stream stays in sync because
/// the size prefix says where the next frame starts. Anything that breaks
/// the stream itself ends the loop and is returned.
pub(crate) async fn run_stream<M: Send + 'static>(
    conn: Arc<TcpConnection>,
    registry: Arc<PacketRegistry<M>>,
    handler: Arc<HandlerSlot<M>>,
    cancel: CancellationToken,
) -> Result<(), TypewireError> {
    let conn_id = conn.id();
    debug!(%conn_id, peer = %conn.peer_addr(), "stream receive loop started");

    let outcome = loop {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            body = read_body(&conn) => body,
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => break Err(e),
        };
        match frame::resolve(&registry, &body) {
            Ok(received) => {
                trace!(%conn_id, id = %received.id, shape = received.shape.name(), "packet received");
                handler.dispatch(received);
            }
            Err(e) if e.is_recoverable() => {
                debug!(%conn_id, error = %e, "skipping undecodable frame");
            }
            Err(e) => break Err(e.into()),
        }
    };

    match &outcome {
        Ok(()) => debug!(%conn_id, "stream receive loop stopped"),
        Err(e) => warn!(%conn_id, error = %e, "stream receive loop ended"),
    }
    outcome
}

/// Reads one size prefix and the body it announces.
async fn read_body(conn: &TcpConnection) -> Result<Vec<u8>, TypewireError> {
    let prefix = conn
        .recv_exact(frame::SIZE_PREFIX_LEN)
        .await?
        .ok_or_else(|| TransportError::closed_by(conn.peer_addr()))?;
    let size = frame::read_size([prefix[0], prefix[1]]);

    let body = conn
        .recv_exact(size)
        .await?
        .ok_or(TransportError::PartialTransfer {
            expected: size,
            actual: 0,
        })?;
    Ok(body)
}

// ---------------------------------------------------------------------------
// Datagram loop
// ---------------------------------------------------------------------------

/// Reads datagrams from `socket` until cancelled or interrupted.
///
/// Malformed and unknown datagrams are dropped; read errors other than
/// `Interrupted` are logged and the loop keeps going.
pub(crate) async fn run_datagram<M: Send + 'static>(
    socket: Arc<DatagramSocket>,
    registry: Arc<PacketRegistry<M>>,
    handler: Arc<HandlerSlot<M>>,
    max_datagram_size: usize,
    cancel: CancellationToken,
) -> Result<(), TypewireError> {
    let mut buf = vec![0u8; max_datagram_size];
    debug!(buffer = max_datagram_size, "datagram receive loop started");

    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, from)) => match frame::resolve_datagram(&registry, &buf[..len]) {
                Ok(packet) => {
                    trace!(%from, id = %packet.id, shape = packet.shape.name(), "datagram received");
                    handler.dispatch(packet);
                }
                Err(e) => debug!(%from, len, error = %e, "ignoring datagram"),
            },
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                debug!("datagram receive interrupted");
                break;
            }
            Err(e) => warn!(error = %e, "datagram receive failed, continuing"),
        }
    }

    debug!("datagram receive loop stopped");
    Ok(())
}
