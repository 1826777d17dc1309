//! The binary field codec.
//!
//! Turns a [`Record`] into bytes and back, visiting fields in the order the
//! [`PacketShape`] declares them. There are no tags or field names on the
//! wire; each field's type alone decides how many bytes it takes:
//!
//! ```text
//! bool            1 byte (0 or 1)
//! i8 / u8         1 byte
//! i16 / u16       2 bytes
//! i32 / u32       4 bytes
//! i64 / u64       8 bytes
//! char            4 bytes (Unicode scalar value)
//! timestamp       8 bytes (i64 microseconds since the Unix epoch)
//! string          4-byte length + UTF-8 bytes, no terminator
//! ```
//!
//! Everything is little-endian. Values whose type doesn't match the shape
//! are rejected rather than skipped, so a successful encode always decodes
//! back to the same record.

use std::time::{Duration, SystemTime};

use bytes::{Buf, BufMut, BytesMut};

use crate::{FieldDescriptor, FieldType, FieldValue, PacketShape, ProtocolError, Record};

/// Byte length of the prefix in front of every string field.
pub const STRING_LENGTH_PREFIX: usize = 4;

/// Returns how many bytes [`encode`] will produce for `record`.
///
/// Validates the record against the shape the same way `encode` does,
/// so a buffer sized from this call is never too small.
pub fn size_of(record: &Record, shape: &PacketShape) -> Result<usize, ProtocolError> {
    check_field_count(record, shape)?;

    let mut size = 0usize;
    for (value, descriptor) in record.fields().iter().zip(shape.fields()) {
        check_field_type(value, descriptor)?;
        size += value.encoded_size();
    }
    Ok(size)
}

/// Encodes `record` into a fresh buffer.
pub fn encode(record: &Record, shape: &PacketShape) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = BytesMut::with_capacity(size_of(record, shape)?);
    encode_into(record, shape, &mut buf)?;
    Ok(buf.to_vec())
}

/// Encodes `record`, appending to `dst`.
///
/// On error nothing useful has been written; callers should discard `dst`.
pub fn encode_into(
    record: &Record,
    shape: &PacketShape,
    dst: &mut BytesMut,
) -> Result<(), ProtocolError> {
    check_field_count(record, shape)?;

    for (value, descriptor) in record.fields().iter().zip(shape.fields()) {
        check_field_type(value, descriptor)?;
        match value {
            FieldValue::Bool(v) => dst.put_u8(u8::from(*v)),
            FieldValue::I8(v) => dst.put_i8(*v),
            FieldValue::U8(v) => dst.put_u8(*v),
            FieldValue::I16(v) => dst.put_i16_le(*v),
            FieldValue::U16(v) => dst.put_u16_le(*v),
            FieldValue::I32(v) => dst.put_i32_le(*v),
            FieldValue::U32(v) => dst.put_u32_le(*v),
            FieldValue::I64(v) => dst.put_i64_le(*v),
            FieldValue::U64(v) => dst.put_u64_le(*v),
            FieldValue::Char(v) => dst.put_u32_le(u32::from(*v)),
            FieldValue::String(s) => {
                let len = u32::try_from(s.len()).map_err(|_| ProtocolError::PacketTooLarge {
                    size: s.len(),
                    max: u32::MAX as usize,
                })?;
                dst.put_u32_le(len);
                dst.put_slice(s.as_bytes());
            }
            FieldValue::Timestamp(t) => dst.put_i64_le(to_micros(*t, descriptor.name)?),
        }
    }
    Ok(())
}

/// Decodes a payload into a record of `shape`.
///
/// The payload must hold exactly the declared fields: running short is
/// [`ProtocolError::Truncated`], leftovers are [`ProtocolError::TrailingBytes`].
pub fn decode(data: &[u8], shape: &PacketShape) -> Result<Record, ProtocolError> {
    let mut src = data;
    let mut fields = Vec::with_capacity(shape.fields().len());

    for descriptor in shape.fields() {
        let name = descriptor.name;
        let value = match descriptor.field_type {
            FieldType::Bool => {
                ensure(src, 1, name)?;
                match src.get_u8() {
                    0 => FieldValue::Bool(false),
                    1 => FieldValue::Bool(true),
                    byte => return Err(ProtocolError::InvalidBool { field: name, byte }),
                }
            }
            FieldType::I8 => {
                ensure(src, 1, name)?;
                FieldValue::I8(src.get_i8())
            }
            FieldType::U8 => {
                ensure(src, 1, name)?;
                FieldValue::U8(src.get_u8())
            }
            FieldType::I16 => {
                ensure(src, 2, name)?;
                FieldValue::I16(src.get_i16_le())
            }
            FieldType::U16 => {
                ensure(src, 2, name)?;
                FieldValue::U16(src.get_u16_le())
            }
            FieldType::I32 => {
                ensure(src, 4, name)?;
                FieldValue::I32(src.get_i32_le())
            }
            FieldType::U32 => {
                ensure(src, 4, name)?;
                FieldValue::U32(src.get_u32_le())
            }
            FieldType::I64 => {
                ensure(src, 8, name)?;
                FieldValue::I64(src.get_i64_le())
            }
            FieldType::U64 => {
                ensure(src, 8, name)?;
                FieldValue::U64(src.get_u64_le())
            }
            FieldType::Char => {
                ensure(src, 4, name)?;
                let value = src.get_u32_le();
                let c = char::from_u32(value)
                    .ok_or(ProtocolError::InvalidChar { field: name, value })?;
                FieldValue::Char(c)
            }
            FieldType::String => {
                ensure(src, STRING_LENGTH_PREFIX, name)?;
                let len = src.get_u32_le() as usize;
                ensure(src, len, name)?;
                let text = std::str::from_utf8(&src[..len])
                    .map_err(|source| ProtocolError::InvalidUtf8 { field: name, source })?
                    .to_owned();
                src.advance(len);
                FieldValue::String(text)
            }
            FieldType::Timestamp => {
                ensure(src, 8, name)?;
                FieldValue::Timestamp(from_micros(src.get_i64_le(), name)?)
            }
        };
        fields.push(value);
    }

    if src.has_remaining() {
        return Err(ProtocolError::TrailingBytes(src.remaining()));
    }
    Ok(Record::new(fields))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_field_count(record: &Record, shape: &PacketShape) -> Result<(), ProtocolError> {
    if record.len() != shape.fields().len() {
        return Err(ProtocolError::FieldCountMismatch {
            shape: shape.name(),
            expected: shape.fields().len(),
            actual: record.len(),
        });
    }
    Ok(())
}

fn check_field_type(value: &FieldValue, descriptor: &FieldDescriptor) -> Result<(), ProtocolError> {
    let found = value.field_type();
    if found != descriptor.field_type {
        return Err(ProtocolError::FieldTypeMismatch {
            field: descriptor.name,
            expected: descriptor.field_type,
            found,
        });
    }
    Ok(())
}

fn ensure(src: &[u8], needed: usize, field: &'static str) -> Result<(), ProtocolError> {
    if src.len() < needed {
        return Err(ProtocolError::Truncated {
            field,
            needed,
            remaining: src.len(),
        });
    }
    Ok(())
}

fn to_micros(t: SystemTime, field: &'static str) -> Result<i64, ProtocolError> {
    let out_of_range = ProtocolError::TimestampOutOfRange { field };
    match t.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_micros()).map_err(|_| out_of_range),
        Err(before) => i64::try_from(before.duration().as_micros())
            .map(|micros| -micros)
            .map_err(|_| out_of_range),
    }
}

fn from_micros(micros: i64, field: &'static str) -> Result<SystemTime, ProtocolError> {
    let offset = Duration::from_micros(micros.unsigned_abs());
    let t = if micros >= 0 {
        SystemTime::UNIX_EPOCH.checked_add(offset)
    } else {
        SystemTime::UNIX_EPOCH.checked_sub(offset)
    };
    t.ok_or(ProtocolError::TimestampOutOfRange { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldDescriptor;

    static EVERYTHING: PacketShape = PacketShape::new(
        "Everything",
        &[
            FieldDescriptor::new("flag", FieldType::Bool),
            FieldDescriptor::new("a", FieldType::I8),
            FieldDescriptor::new("b", FieldType::U8),
            FieldDescriptor::new("c", FieldType::I16),
            FieldDescriptor::new("d", FieldType::U16),
            FieldDescriptor::new("e", FieldType::I32),
            FieldDescriptor::new("f", FieldType::U32),
            FieldDescriptor::new("g", FieldType::I64),
            FieldDescriptor::new("h", FieldType::U64),
            FieldDescriptor::new("letter", FieldType::Char),
            FieldDescriptor::new("text", FieldType::String),
            FieldDescriptor::new("at", FieldType::Timestamp),
        ],
    );

    static MESSAGE: PacketShape = PacketShape::new(
        "Message",
        &[
            FieldDescriptor::new("message", FieldType::String),
            FieldDescriptor::new("created_at", FieldType::Timestamp),
        ],
    );

    fn everything(text: &str, at: SystemTime) -> Record {
        Record::new(vec![
            FieldValue::Bool(true),
            FieldValue::I8(i8::MIN),
            FieldValue::U8(u8::MAX),
            FieldValue::I16(-1234),
            FieldValue::U16(65_000),
            FieldValue::I32(i32::MIN),
            FieldValue::U32(u32::MAX),
            FieldValue::I64(-9_000_000_000),
            FieldValue::U64(u64::MAX),
            FieldValue::Char('🦀'),
            FieldValue::String(text.into()),
            FieldValue::Timestamp(at),
        ])
    }

    fn micros_since_epoch(micros: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_micros(micros)
    }

    #[test]
    fn test_round_trip_all_scalar_types() {
        let record = everything("héllo wörld", micros_since_epoch(1_700_000_000_123_456));
        let bytes = encode(&record, &EVERYTHING).unwrap();
        assert_eq!(size_of(&record, &EVERYTHING).unwrap(), bytes.len());
        assert_eq!(decode(&bytes, &EVERYTHING).unwrap(), record);
    }

    #[test]
    fn test_round_trip_pre_epoch_timestamp() {
        let before = SystemTime::UNIX_EPOCH - Duration::from_micros(86_400_000_001);
        let record = everything("", before);
        let bytes = encode(&record, &EVERYTHING).unwrap();
        assert_eq!(decode(&bytes, &EVERYTHING).unwrap(), record);
    }

    #[test]
    fn test_fixed_layout_is_little_endian() {
        let record = Record::new(vec![
            FieldValue::String("hi".into()),
            FieldValue::Timestamp(micros_since_epoch(1)),
        ]);
        let bytes = encode(&record, &MESSAGE).unwrap();
        assert_eq!(
            bytes,
            [2, 0, 0, 0, b'h', b'i', 1, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_size_of_counts_string_bytes_not_chars() {
        let record = Record::new(vec![
            FieldValue::String("ü".into()),
            FieldValue::Timestamp(SystemTime::UNIX_EPOCH),
        ]);
        assert_eq!(size_of(&record, &MESSAGE).unwrap(), 4 + 2 + 8);
    }

    #[test]
    fn test_encode_rejects_mismatched_type() {
        let record = Record::new(vec![
            FieldValue::String("hi".into()),
            FieldValue::U64(5),
        ]);
        let err = encode(&record, &MESSAGE).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FieldTypeMismatch {
                field: "created_at",
                ..
            }
        ));
        assert!(size_of(&record, &MESSAGE).is_err());
    }

    #[test]
    fn test_encode_rejects_wrong_field_count() {
        let record = Record::new(vec![FieldValue::String("hi".into())]);
        assert!(matches!(
            encode(&record, &MESSAGE),
            Err(ProtocolError::FieldCountMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_decode_truncated_string() {
        // Length prefix claims 10 bytes, only 3 follow.
        let bytes = [10, 0, 0, 0, b'a', b'b', b'c'];
        let err = decode(&bytes, &MESSAGE).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                field: "message",
                needed: 10,
                remaining: 3
            }
        ));
    }

    #[test]
    fn test_decode_truncated_fixed_field() {
        let bytes = [0, 0, 0, 0, 1, 2, 3];
        assert!(matches!(
            decode(&bytes, &MESSAGE),
            Err(ProtocolError::Truncated { field: "created_at", needed: 8, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let record = Record::new(vec![
            FieldValue::String(String::new()),
            FieldValue::Timestamp(SystemTime::UNIX_EPOCH),
        ]);
        let mut bytes = encode(&record, &MESSAGE).unwrap();
        bytes.push(0xAA);
        assert!(matches!(
            decode(&bytes, &MESSAGE),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let bytes = [1, 0, 0, 0, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            decode(&bytes, &MESSAGE),
            Err(ProtocolError::InvalidUtf8 { field: "message", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_bool_and_char() {
        static FLAGS: PacketShape = PacketShape::new(
            "Flags",
            &[
                FieldDescriptor::new("on", FieldType::Bool),
                FieldDescriptor::new("letter", FieldType::Char),
            ],
        );
        assert!(matches!(
            decode(&[2, 65, 0, 0, 0], &FLAGS),
            Err(ProtocolError::InvalidBool { field: "on", byte: 2 })
        ));
        // 0xD800 is a surrogate, not a scalar value.
        assert!(matches!(
            decode(&[1, 0x00, 0xD8, 0, 0], &FLAGS),
            Err(ProtocolError::InvalidChar { field: "letter", value: 0xD800 })
        ));
    }

    #[test]
    fn test_empty_shape_encodes_to_nothing() {
        static UNIT: PacketShape = PacketShape::new("Unit", &[]);
        let bytes = encode(&Record::default(), &UNIT).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(decode(&bytes, &UNIT).unwrap(), Record::default());
    }
}
