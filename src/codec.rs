//! Field serializer: packs and unpacks positional values against a layout.
//!
//! All multi-byte primitives are little-endian; floats are IEEE-754 single
//! precision. Deserialization ignores surplus trailing bytes so payloads from
//! newer firmware with appended fields still decode.

use crate::types::{FieldType, ObjectLayout, Value};
use crate::{Result, UavTalkError};

/// Unpack a payload into one value per layout slot.
pub fn deserialize(layout: &ObjectLayout, bytes: &[u8]) -> Result<Vec<Value>> {
    if bytes.len() < layout.byte_len() {
        return Err(UavTalkError::serialization(
            "unpack",
            format!("need {} bytes, got {}", layout.byte_len(), bytes.len()),
        ));
    }

    layout
        .slots()
        .iter()
        .map(|slot| {
            let end = slot.offset + slot.field_type.size();
            let raw = bytes
                .get(slot.offset..end)
                .ok_or_else(|| UavTalkError::serialization("unpack", format!("slot '{}' out of range", slot.name)))?;
            read_value(slot.field_type, raw)
        })
        .collect()
}

/// Pack one value per layout slot into a payload.
///
/// Values are coerced into their slot type; a value that does not fit its
/// slot's width fails the whole operation.
pub fn serialize(layout: &ObjectLayout, values: &[Value]) -> Result<Vec<u8>> {
    if values.len() != layout.slot_count() {
        return Err(UavTalkError::serialization(
            "pack",
            format!("expected {} values, got {}", layout.slot_count(), values.len()),
        ));
    }

    let mut out = Vec::with_capacity(layout.byte_len());
    for (value, slot) in values.iter().zip(layout.slots()) {
        let coerced = value.coerce(slot.field_type).ok_or_else(|| {
            UavTalkError::serialization(
                "pack",
                format!("{value} does not fit {} slot '{}'", slot.field_type, slot.name),
            )
        })?;
        write_value(&mut out, coerced);
    }
    Ok(out)
}

fn read_value(field_type: FieldType, raw: &[u8]) -> Result<Value> {
    let short = || UavTalkError::serialization("unpack", format!("short {field_type} slot"));
    let value = match field_type {
        FieldType::Int8 => Value::Int8(i8::from_le_bytes(raw.try_into().map_err(|_| short())?)),
        FieldType::UInt8 => Value::UInt8(raw.first().copied().ok_or_else(short)?),
        FieldType::Enum8 => Value::Enum8(raw.first().copied().ok_or_else(short)?),
        FieldType::Int16 => Value::Int16(i16::from_le_bytes(raw.try_into().map_err(|_| short())?)),
        FieldType::UInt16 => Value::UInt16(u16::from_le_bytes(raw.try_into().map_err(|_| short())?)),
        FieldType::Int32 => Value::Int32(i32::from_le_bytes(raw.try_into().map_err(|_| short())?)),
        FieldType::UInt32 => Value::UInt32(u32::from_le_bytes(raw.try_into().map_err(|_| short())?)),
        FieldType::Float32 => Value::Float32(f32::from_le_bytes(raw.try_into().map_err(|_| short())?)),
    };
    Ok(value)
}

fn write_value(out: &mut Vec<u8>, value: Value) {
    match value {
        Value::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt8(v) | Value::Enum8(v) => out.push(v),
        Value::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
    }
}
