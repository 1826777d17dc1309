//! Core protocol types: packet ids, field types, shapes, and values.
//!
//! A packet travels as an ordered list of fields. The [`PacketShape`] says
//! which fields exist and what type each one has; a [`Record`] holds the
//! matching values. Neither side of a connection sends field names or tags,
//! so both must agree on the shape, field for field.

use std::fmt;
use std::time::SystemTime;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The numeric id a packet shape is registered under.
///
/// Newtype over the `u16` that goes on the wire. Ids are handed out from 1
/// upward in registration order; 0 is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId(pub u16);

impl PacketId {
    /// The first id a registry hands out.
    pub const FIRST: PacketId = PacketId(1);

    /// Returns the raw wire value.
    pub fn into_inner(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// The semantic type of a packet field, which fixes its binary layout.
///
/// The set is closed on purpose: a Rust type can only appear in a packet
/// if it implements [`WireField`](crate::WireField), and that trait is
/// implemented for exactly these types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// A Unicode scalar value, sent as 4 bytes.
    Char,
    /// UTF-8 text, sent as a `u32` byte length followed by the bytes.
    String,
    /// A point in time, sent as signed microseconds since the Unix epoch.
    Timestamp,
}

impl FieldType {
    /// Returns the encoded width for fixed-size types, `None` for strings.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::I32 | Self::U32 | Self::Char => Some(4),
            Self::I64 | Self::U64 | Self::Timestamp => Some(8),
            Self::String => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::Char => "char",
            Self::String => "string",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// One declared field of a packet shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// The field's name (diagnostics only; never sent).
    pub name: &'static str,
    /// The field's semantic type.
    pub field_type: FieldType,
}

impl FieldDescriptor {
    /// Creates a descriptor. `const` so shapes can live in statics.
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type }
    }
}

/// The declared layout of one message type.
///
/// Shapes are `'static`: they are written down once per packet type
/// (usually by the [`packet!`](crate::packet) macro) and referenced from
/// then on. Two shapes are the same shape when their names match; the
/// registry refuses a second shape under an existing name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketShape {
    name: &'static str,
    fields: &'static [FieldDescriptor],
}

impl PacketShape {
    /// Creates a shape from a name and its fields in wire order.
    pub const fn new(name: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        Self { name, fields }
    }

    /// The shape's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The fields, in the order they are encoded.
    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.fields
    }
}

impl fmt::Display for PacketShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{}: {}", field.name, field.field_type)?;
        }
        f.write_str(" }")
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single field value, tagged with its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Char(char),
    String(String),
    Timestamp(SystemTime),
}

impl FieldValue {
    /// The type tag of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Bool(_) => FieldType::Bool,
            Self::I8(_) => FieldType::I8,
            Self::U8(_) => FieldType::U8,
            Self::I16(_) => FieldType::I16,
            Self::U16(_) => FieldType::U16,
            Self::I32(_) => FieldType::I32,
            Self::U32(_) => FieldType::U32,
            Self::I64(_) => FieldType::I64,
            Self::U64(_) => FieldType::U64,
            Self::Char(_) => FieldType::Char,
            Self::String(_) => FieldType::String,
            Self::Timestamp(_) => FieldType::Timestamp,
        }
    }

    /// Number of bytes this value occupies on the wire.
    pub fn encoded_size(&self) -> usize {
        match self {
            Self::Bool(_) | Self::I8(_) | Self::U8(_) => 1,
            Self::I16(_) | Self::U16(_) => 2,
            Self::I32(_) | Self::U32(_) | Self::Char(_) => 4,
            Self::I64(_) | Self::U64(_) | Self::Timestamp(_) => 8,
            Self::String(s) => 4 + s.len(),
        }
    }
}

/// The values of one packet, in shape order.
///
/// This is the dynamic form the codec works on. Typed packets convert to
/// and from it through the [`Packet`](crate::Packet) trait.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<FieldValue>,
}

impl Record {
    /// Wraps an ordered list of values.
    pub fn new(fields: Vec<FieldValue>) -> Self {
        Self { fields }
    }

    /// The values, in shape order.
    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// Consumes the record, returning its values.
    pub fn into_fields(self) -> Vec<FieldValue> {
        self.fields
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no values.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Vec<FieldValue>> for Record {
    fn from(fields: Vec<FieldValue>) -> Self {
        Self::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static POINT: PacketShape = PacketShape::new(
        "Point",
        &[
            FieldDescriptor::new("x", FieldType::I32),
            FieldDescriptor::new("y", FieldType::I32),
            FieldDescriptor::new("label", FieldType::String),
        ],
    );

    #[test]
    fn test_packet_id_display() {
        assert_eq!(PacketId(3).to_string(), "#3");
        assert_eq!(PacketId::FIRST.into_inner(), 1);
    }

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(FieldType::Bool.fixed_size(), Some(1));
        assert_eq!(FieldType::U16.fixed_size(), Some(2));
        assert_eq!(FieldType::Char.fixed_size(), Some(4));
        assert_eq!(FieldType::Timestamp.fixed_size(), Some(8));
        assert_eq!(FieldType::String.fixed_size(), None);
    }

    #[test]
    fn test_shape_display_lists_fields_in_order() {
        assert_eq!(POINT.to_string(), "Point { x: i32, y: i32, label: string }");
        assert_eq!(POINT.fields().len(), 3);
        assert_eq!(POINT.name(), "Point");
    }

    #[test]
    fn test_field_value_reports_its_type() {
        assert_eq!(FieldValue::U64(1).field_type(), FieldType::U64);
        assert_eq!(
            FieldValue::String("hi".into()).field_type(),
            FieldType::String
        );
        assert_eq!(
            FieldValue::Timestamp(SystemTime::UNIX_EPOCH).field_type(),
            FieldType::Timestamp
        );
    }
}
