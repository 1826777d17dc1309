//! Wire protocol for typewire.
//!
//! This crate defines how typed packets become bytes and back:
//!
//! - **Types** ([`PacketShape`], [`FieldType`], [`FieldValue`], [`Record`]):
//!   the declared layout of a packet and its values.
//! - **Packets** ([`Packet`], [`packet!`]): Rust structs with a statically
//!   declared field list.
//! - **Codec** ([`codec`]): field-by-field binary encoding of a record.
//! - **Registry** ([`PacketRegistry`]): the shape ⇄ id table.
//! - **Framing** ([`frame`]): the `[size][id][payload]` wire layout.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes) and the
//! connection state machines. It knows nothing about sockets.
//!
//! ```text
//! Transport (bytes) → frame → registry → codec → typed packet
//! ```

pub mod codec;
mod error;
pub mod frame;
mod packet;
mod registry;
mod types;

pub use error::ProtocolError;
pub use packet::{Packet, RecordReader, WireField};
pub use registry::{PacketRegistry, Received};
pub use types::{FieldDescriptor, FieldType, FieldValue, PacketId, PacketShape, Record};
