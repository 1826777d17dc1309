//! Framing: how one encoded packet is laid out on the wire.
//!
//! ```text
//! ┌─────────────┬─────────────┬──────────────────────┐
//! │ Size (2B LE)│ Id (2B LE)  │ Payload              │
//! │ = 2 + len   │ registry id │ codec-encoded fields │
//! └─────────────┴─────────────┴──────────────────────┘
//! ```
//!
//! `Size` counts the id and the payload, not itself, and must fit in a
//! `u16`. The same layout is used on TCP streams and in UDP datagrams.
//!
//! Reading a stream is split in two: read [`SIZE_PREFIX_LEN`] bytes and
//! pass them to [`read_size`], then read that many bytes (the "body") and
//! hand them to [`resolve`]. Datagrams arrive whole and go through
//! [`resolve_datagram`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Packet, PacketId, PacketRegistry, ProtocolError, Received, codec};

/// Length of the size prefix.
pub const SIZE_PREFIX_LEN: usize = 2;

/// Length of the packet id.
pub const PACKET_ID_LEN: usize = 2;

/// Size prefix plus packet id.
pub const HEADER_SIZE: usize = SIZE_PREFIX_LEN + PACKET_ID_LEN;

/// Largest value the size prefix can carry (id + payload).
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Largest payload that fits in one frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - PACKET_ID_LEN;

/// Encodes `packet` into a complete frame, ready to write.
///
/// # Errors
/// - [`ProtocolError::NotRegistered`] if `P` has no id in `registry`.
/// - [`ProtocolError::PacketTooLarge`] if id + payload exceed 65535 bytes.
///   Nothing is encoded in that case.
pub fn prepare<M, P>(registry: &PacketRegistry<M>, packet: &P) -> Result<Bytes, ProtocolError>
where
    M: 'static,
    P: Packet,
{
    let id = registry.id_of::<P>()?;
    let shape = P::shape();
    let record = packet.to_record();

    let size = PACKET_ID_LEN + codec::size_of(&record, shape)?;
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::PacketTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(SIZE_PREFIX_LEN + size);
    buf.put_u16_le(size as u16);
    buf.put_u16_le(id.into_inner());
    codec::encode_into(&record, shape, &mut buf)?;

    tracing::trace!(%id, shape = shape.name(), size, "frame prepared");
    Ok(buf.freeze())
}

/// Parses the size prefix: the number of body bytes that follow it.
pub fn read_size(prefix: [u8; SIZE_PREFIX_LEN]) -> usize {
    u16::from_le_bytes(prefix) as usize
}

/// Splits a body into its packet id and payload.
pub fn split_body(body: &[u8]) -> Result<(PacketId, &[u8]), ProtocolError> {
    if body.len() < PACKET_ID_LEN {
        return Err(ProtocolError::MalformedFrame(format!(
            "frame body is {} bytes, too short for a packet id",
            body.len()
        )));
    }
    let (id, payload) = body.split_at(PACKET_ID_LEN);
    Ok((PacketId(u16::from_le_bytes([id[0], id[1]])), payload))
}

/// Decodes a frame body (everything after the size prefix).
pub fn resolve<M: 'static>(
    registry: &PacketRegistry<M>,
    body: &[u8],
) -> Result<Received<M>, ProtocolError> {
    let (id, payload) = split_body(body)?;
    registry.decode(id, payload)
}

/// Decodes a whole datagram, size prefix included.
///
/// The size prefix must match the datagram's actual length.
pub fn resolve_datagram<M: 'static>(
    registry: &PacketRegistry<M>,
    datagram: &[u8],
) -> Result<Received<M>, ProtocolError> {
    if datagram.len() < SIZE_PREFIX_LEN {
        return Err(ProtocolError::MalformedFrame(format!(
            "datagram is {} bytes, too short for a size prefix",
            datagram.len()
        )));
    }
    let (prefix, body) = datagram.split_at(SIZE_PREFIX_LEN);
    let size = read_size([prefix[0], prefix[1]]);
    if size != body.len() {
        return Err(ProtocolError::MalformedFrame(format!(
            "size prefix says {size} bytes, datagram carries {}",
            body.len()
        )));
    }
    resolve(registry, body)
}
