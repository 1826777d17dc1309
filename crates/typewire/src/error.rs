//! Unified error type for typewire.

use typewire_protocol::ProtocolError;
use typewire_transport::TransportError;

/// Top-level error that wraps the errors of every layer.
///
/// The `#[from]` attribute on each wrapped variant generates a `From` impl,
/// so `?` converts transport and protocol errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TypewireError {
    /// A transport-level error (bind, connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (registry, framing, codec).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The operation is not allowed in the current lifecycle state.
    ///
    /// Always a caller bug: connecting twice, sending before `connect`,
    /// stopping something that is not running.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The background receive task panicked or was aborted.
    #[error("receive task failed: {0}")]
    ReceiveTaskFailed(String),
}
