//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the problem is in how a packet maps to
//! bytes (registry lookups, framing, field encoding), never in networking.

use crate::{FieldType, PacketId};

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A shape with this name was already registered.
    ///
    /// Registration happens once at startup, so this is a programming
    /// error rather than something to recover from.
    #[error("packet shape `{0}` is already registered")]
    DuplicateRegistration(&'static str),

    /// The packet type was never registered, so it has no id to send under.
    #[error("packet shape `{0}` is not registered")]
    NotRegistered(String),

    /// An inbound frame carried an id that maps to no shape.
    ///
    /// Happens when the remote side registered a different set of packets
    /// or registered them in a different order.
    #[error("unknown packet id {0}")]
    UnknownPacketId(PacketId),

    /// Every 16-bit id is taken.
    #[error("packet registry is full ({} ids assigned)", u16::MAX)]
    RegistryFull,

    /// The encoded frame would not fit the 16-bit size prefix.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The frame header is inconsistent with the bytes that carried it.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The payload ended before a field could be read in full.
    #[error("field `{field}` truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// Bytes were left over after every declared field was decoded.
    #[error("{0} trailing bytes after the last field")]
    TrailingBytes(usize),

    /// A record does not have one value per declared field.
    #[error("shape `{shape}` declares {expected} fields, record has {actual}")]
    FieldCountMismatch {
        shape: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A value does not match the declared type of its field.
    #[error("field `{field}` expects {expected}, got {found}")]
    FieldTypeMismatch {
        field: &'static str,
        expected: FieldType,
        found: FieldType,
    },

    /// A string field is not valid UTF-8.
    #[error("field `{field}` is not valid UTF-8: {source}")]
    InvalidUtf8 {
        field: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },

    /// A boolean field holds something other than 0 or 1.
    #[error("field `{field}` holds invalid boolean byte {byte:#04x}")]
    InvalidBool { field: &'static str, byte: u8 },

    /// A char field holds a value that is not a Unicode scalar.
    #[error("field `{field}` holds invalid char {value:#x}")]
    InvalidChar { field: &'static str, value: u32 },

    /// A timestamp cannot be represented on the wire or in `SystemTime`.
    #[error("field `{field}` holds a timestamp out of range")]
    TimestampOutOfRange { field: &'static str },
}

impl ProtocolError {
    /// Returns `true` if a receive loop can skip the offending frame and
    /// carry on.
    ///
    /// Every inbound error is caught after the whole frame was consumed,
    /// so the stream is still aligned on the next frame boundary.
    /// Registration and size errors only happen on the sending side.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::DuplicateRegistration(_)
                | Self::NotRegistered(_)
                | Self::RegistryFull
                | Self::PacketTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_packet_id_is_recoverable() {
        assert!(ProtocolError::UnknownPacketId(PacketId(9)).is_recoverable());
        assert!(ProtocolError::TrailingBytes(3).is_recoverable());
    }

    #[test]
    fn test_sender_side_errors_are_not_recoverable() {
        assert!(!ProtocolError::RegistryFull.is_recoverable());
        assert!(!ProtocolError::PacketTooLarge { size: 70_000, max: 65_535 }.is_recoverable());
        assert!(!ProtocolError::DuplicateRegistration("Chat").is_recoverable());
    }

    #[test]
    fn test_error_messages_name_the_field() {
        let err = ProtocolError::FieldTypeMismatch {
            field: "created_at",
            expected: FieldType::Timestamp,
            found: FieldType::String,
        };
        assert_eq!(err.to_string(), "field `created_at` expects timestamp, got string");
    }
}
