//! The packet registry: a two-way table between packet shapes and ids.
//!
//! Both ends of a connection must register the same packet types in the
//! same order, because ids are handed out sequentially (1, 2, 3, ...) and
//! only the id travels on the wire.
//!
//! The registry is an ordinary value, not global state. Build it once at
//! startup, wrap it in an `Arc`, and hand a clone to every client, server,
//! or node. After that it is read-only, so receive loops never lock it.
//!
//! # The `M` parameter
//!
//! `M` is the type inbound packets are decoded into, usually an enum with
//! one variant per packet type. Each registered `P` must convert into it:
//!
//! ```rust
//! use typewire_protocol::{packet, PacketRegistry};
//!
//! packet! { pub struct Ping { pub seq: u32 } }
//! packet! { pub struct Pong { pub seq: u32 } }
//!
//! enum Msg { Ping(Ping), Pong(Pong) }
//! impl From<Ping> for Msg { fn from(p: Ping) -> Self { Msg::Ping(p) } }
//! impl From<Pong> for Msg { fn from(p: Pong) -> Self { Msg::Pong(p) } }
//!
//! let mut registry = PacketRegistry::<Msg>::new();
//! registry.register::<Ping>().unwrap();
//! registry.register::<Pong>().unwrap();
//! assert_eq!(registry.id_of::<Pong>().unwrap().into_inner(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::{Packet, PacketId, PacketShape, ProtocolError, Record, codec};

/// Decoder from a record into the caller's message type.
type DecodeFn<M> = fn(Record) -> Result<M, ProtocolError>;

struct Entry<M> {
    shape: &'static PacketShape,
    decode: DecodeFn<M>,
}

/// A decoded inbound packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Received<M> {
    /// The id the packet arrived under.
    pub id: PacketId,
    /// The shape registered under that id.
    pub shape: &'static PacketShape,
    /// The decoded packet.
    pub packet: M,
}

/// Maps packet shapes to ids and back.
pub struct PacketRegistry<M> {
    /// `entries[i]` is registered under id `i + 1`.
    entries: Vec<Entry<M>>,
    /// Shape name → id.
    ids: HashMap<&'static str, PacketId>,
}

impl<M: 'static> PacketRegistry<M> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            ids: HashMap::new(),
        }
    }

    /// Registers packet type `P` under the next free id.
    ///
    /// # Errors
    /// - [`ProtocolError::DuplicateRegistration`] if a shape with the same
    ///   name is already registered.
    /// - [`ProtocolError::RegistryFull`] once all 65535 ids are taken.
    pub fn register<P>(&mut self) -> Result<PacketId, ProtocolError>
    where
        P: Packet + Into<M>,
    {
        let shape = P::shape();
        if self.ids.contains_key(shape.name()) {
            return Err(ProtocolError::DuplicateRegistration(shape.name()));
        }

        let raw = u16::try_from(self.entries.len() + 1).map_err(|_| ProtocolError::RegistryFull)?;
        let id = PacketId(raw);

        self.entries.push(Entry {
            shape,
            decode: decode_as::<M, P>,
        });
        self.ids.insert(shape.name(), id);

        tracing::debug!(%id, shape = shape.name(), "packet registered");
        Ok(id)
    }

    /// Returns the id packet type `P` was registered under.
    pub fn id_of<P: Packet>(&self) -> Result<PacketId, ProtocolError> {
        self.id_of_shape(P::shape())
    }

    /// Returns the id `shape` was registered under.
    ///
    /// A shape that shares a name with a registered one but declares
    /// different fields is not registered.
    pub fn id_of_shape(&self, shape: &PacketShape) -> Result<PacketId, ProtocolError> {
        self.ids
            .get(shape.name())
            .copied()
            .filter(|id| self.entry(*id).is_some_and(|e| e.shape == shape))
            .ok_or_else(|| ProtocolError::NotRegistered(shape.name().to_string()))
    }

    /// Returns the shape registered under `id`.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownPacketId`] if nothing is registered there,
    /// typically because the remote side registered a different set.
    pub fn shape_of(&self, id: PacketId) -> Result<&'static PacketShape, ProtocolError> {
        self.entry(id)
            .map(|e| e.shape)
            .ok_or(ProtocolError::UnknownPacketId(id))
    }

    /// Decodes `payload` as the packet registered under `id`.
    pub fn decode(&self, id: PacketId, payload: &[u8]) -> Result<Received<M>, ProtocolError> {
        let entry = self.entry(id).ok_or(ProtocolError::UnknownPacketId(id))?;
        let record = codec::decode(payload, entry.shape)?;
        let packet = (entry.decode)(record)?;
        Ok(Received {
            id,
            shape: entry.shape,
            packet,
        })
    }

    /// Number of registered shapes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(id, shape)` pairs in id order.
    pub fn shapes(&self) -> impl Iterator<Item = (PacketId, &'static PacketShape)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (PacketId(i as u16 + 1), e.shape))
    }

    fn entry(&self, id: PacketId) -> Option<&Entry<M>> {
        let index = usize::from(id.0).checked_sub(1)?;
        self.entries.get(index)
    }
}

impl<M: 'static> Default for PacketRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for PacketRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.shape.name()))
            .finish()
    }
}

fn decode_as<M, P>(record: Record) -> Result<M, ProtocolError>
where
    P: Packet + Into<M>,
{
    P::from_record(record).map(Into::into)
}
