//! The [`Packet`] trait and the [`packet!`](crate::packet) macro.
//!
//! Instead of discovering fields at runtime, every packet type states its
//! fields up front, in wire order. The macro writes that list for you from
//! a plain struct definition, so field order is fixed at compile time:
//!
//! ```rust
//! use std::time::SystemTime;
//! use typewire_protocol::{packet, Packet};
//!
//! packet! {
//!     /// A chat line.
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub struct ChatMessage {
//!         pub message: String,
//!         pub created_at: SystemTime,
//!     }
//! }
//!
//! let shape = ChatMessage::shape();
//! assert_eq!(shape.name(), "ChatMessage");
//! assert_eq!(shape.fields()[1].name, "created_at");
//! ```

use std::time::SystemTime;

use crate::{FieldType, FieldValue, PacketShape, ProtocolError, Record};

/// A Rust type that can appear as a packet field.
///
/// Implemented for `bool`, the 8/16/32/64-bit integers, `char`, `String`,
/// and `SystemTime`. Anything else is rejected at compile time.
pub trait WireField: Sized {
    /// The semantic type this Rust type maps to.
    const FIELD_TYPE: FieldType;

    /// Converts the value into its tagged form.
    fn to_value(&self) -> FieldValue;

    /// Extracts the value from its tagged form. `field` names the field
    /// for error messages.
    fn from_value(value: FieldValue, field: &'static str) -> Result<Self, ProtocolError>;
}

macro_rules! impl_wire_field {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl WireField for $ty {
                const FIELD_TYPE: FieldType = FieldType::$variant;

                fn to_value(&self) -> FieldValue {
                    FieldValue::$variant(self.clone())
                }

                fn from_value(
                    value: FieldValue,
                    field: &'static str,
                ) -> Result<Self, ProtocolError> {
                    match value {
                        FieldValue::$variant(v) => Ok(v),
                        other => Err(ProtocolError::FieldTypeMismatch {
                            field,
                            expected: FieldType::$variant,
                            found: other.field_type(),
                        }),
                    }
                }
            }
        )*
    };
}

impl_wire_field! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    char => Char,
    String => String,
    SystemTime => Timestamp,
}

/// A message type that can be registered and sent.
///
/// Implement it with the [`packet!`](crate::packet) macro, or by hand when
/// the struct needs something the macro doesn't cover. A hand-written
/// `from_record` should use [`RecordReader`] so field errors carry names.
pub trait Packet: Send + Sync + Sized + 'static {
    /// The static field layout of this packet type.
    fn shape() -> &'static PacketShape;

    /// Converts the packet into its values, in shape order.
    fn to_record(&self) -> Record;

    /// Rebuilds the packet from values in shape order.
    fn from_record(record: Record) -> Result<Self, ProtocolError>;
}

/// Walks a [`Record`] alongside its shape, handing out typed fields.
pub struct RecordReader {
    shape: &'static PacketShape,
    values: std::vec::IntoIter<FieldValue>,
    index: usize,
}

impl RecordReader {
    /// Starts reading `record`, checking it has one value per field.
    pub fn new(record: Record, shape: &'static PacketShape) -> Result<Self, ProtocolError> {
        if record.len() != shape.fields().len() {
            return Err(ProtocolError::FieldCountMismatch {
                shape: shape.name(),
                expected: shape.fields().len(),
                actual: record.len(),
            });
        }
        Ok(Self {
            shape,
            values: record.into_fields().into_iter(),
            index: 0,
        })
    }

    /// Takes the next field as `T`.
    pub fn next_field<T: WireField>(&mut self) -> Result<T, ProtocolError> {
        let descriptor = self.shape.fields().get(self.index).ok_or(
            ProtocolError::FieldCountMismatch {
                shape: self.shape.name(),
                expected: self.shape.fields().len(),
                actual: self.index + 1,
            },
        )?;
        let value = self
            .values
            .next()
            .ok_or(ProtocolError::FieldCountMismatch {
                shape: self.shape.name(),
                expected: self.shape.fields().len(),
                actual: self.index,
            })?;
        self.index += 1;
        T::from_value(value, descriptor.name)
    }
}

/// Declares a struct and implements [`Packet`] for it.
///
/// Every field type must implement [`WireField`]. Field order in the
/// struct is the wire order. Attributes (derives, docs) pass through.
#[macro_export]
macro_rules! packet {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::Packet for $name {
            fn shape() -> &'static $crate::PacketShape {
                static SHAPE: $crate::PacketShape = $crate::PacketShape::new(
                    stringify!($name),
                    &[
                        $(
                            $crate::FieldDescriptor::new(
                                stringify!($field),
                                <$ty as $crate::WireField>::FIELD_TYPE,
                            ),
                        )*
                    ],
                );
                &SHAPE
            }

            fn to_record(&self) -> $crate::Record {
                $crate::Record::new(vec![
                    $( $crate::WireField::to_value(&self.$field), )*
                ])
            }

            #[allow(unused_mut, unused_variables)]
            fn from_record(
                record: $crate::Record,
            ) -> ::std::result::Result<Self, $crate::ProtocolError> {
                let mut reader = $crate::RecordReader::new(
                    record,
                    <Self as $crate::Packet>::shape(),
                )?;
                Ok(Self {
                    $( $field: reader.next_field::<$ty>()?, )*
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use crate::{FieldType, FieldValue, Packet, ProtocolError, Record};

    crate::packet! {
        #[derive(Debug, Clone, PartialEq)]
        struct Sample {
            flag: bool,
            count: u32,
            letter: char,
            note: String,
            at: SystemTime,
        }
    }

    crate::packet! {
        #[derive(Debug, PartialEq)]
        struct Empty {}
    }

    fn sample() -> Sample {
        Sample {
            flag: true,
            count: 7,
            letter: 'λ',
            note: "hello".into(),
            at: SystemTime::UNIX_EPOCH + Duration::from_secs(10),
        }
    }

    #[test]
    fn test_macro_shape_follows_declaration_order() {
        let shape = Sample::shape();
        assert_eq!(shape.name(), "Sample");
        let names: Vec<_> = shape.fields().iter().map(|f| f.name).collect();
        assert_eq!(names, ["flag", "count", "letter", "note", "at"]);
        let types: Vec<_> = shape.fields().iter().map(|f| f.field_type).collect();
        assert_eq!(
            types,
            [
                FieldType::Bool,
                FieldType::U32,
                FieldType::Char,
                FieldType::String,
                FieldType::Timestamp
            ]
        );
    }

    #[test]
    fn test_shape_is_a_single_static() {
        assert!(std::ptr::eq(Sample::shape(), Sample::shape()));
    }

    #[test]
    fn test_record_conversion_preserves_values() {
        let record = sample().to_record();
        assert_eq!(record.fields()[1], FieldValue::U32(7));
        assert_eq!(Sample::from_record(record).unwrap(), sample());
    }

    #[test]
    fn test_empty_packet_has_no_fields() {
        assert!(Empty::shape().fields().is_empty());
        assert!(Empty {}.to_record().is_empty());
        assert_eq!(Empty::from_record(Record::default()).unwrap(), Empty {});
    }

    #[test]
    fn test_from_record_rejects_wrong_field_count() {
        let record = Record::new(vec![FieldValue::Bool(true)]);
        let err = Sample::from_record(record).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FieldCountMismatch {
                expected: 5,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_from_record_rejects_wrong_field_type() {
        let mut fields = sample().to_record().into_fields();
        fields[1] = FieldValue::I64(7);
        let err = Sample::from_record(Record::new(fields)).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FieldTypeMismatch {
                field: "count",
                expected: FieldType::U32,
                found: FieldType::I64,
            }
        ));
    }
}
